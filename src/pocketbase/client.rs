use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

lazy_static! {
    /// PocketBase ids are 15 lowercase alphanumerics; anything that could
    /// leave the path segment is refused
    static ref RECORD_ID_RE: Regex =
        Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid record id regex");
}

/// Page size used when walking every page of a collection
const LIST_ALL_PAGE_SIZE: u32 = 200;

/// Query parameters for `GET /api/collections/{collection}/records`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 30,
            filter: None,
            sort: None,
            expand: None,
        }
    }
}

/// Paginated list response
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthStatus {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Clone)]
struct Credentials {
    identity: String,
    password: String,
}

/// PocketBase REST client
pub struct PocketBaseClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
    token: RwLock<Option<String>>,
}

impl PocketBaseClient {
    /// Create an anonymous client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
            token: RwLock::new(None),
        })
    }

    /// Authenticate as a superuser before the first request
    pub fn with_credentials(mut self, identity: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            identity: identity.into(),
            password: password.into(),
        });
        self
    }

    /// Build a client from storage configuration, reading the password from the environment
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let client = Self::new(&config.pocketbase_url, Duration::from_secs(config.timeout_secs))?;

        match &config.admin_email {
            Some(email) => {
                let password = std::env::var(&config.admin_password_env).map_err(|_| {
                    AppError::Configuration(format!(
                        "PocketBase admin email is set but {} is not",
                        config.admin_password_env
                    ))
                })?;
                Ok(client.with_credentials(email.clone(), password))
            }
            None => Ok(client),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange credentials for an auth token
    pub async fn authenticate(&self) -> Result<()> {
        let Some(creds) = &self.credentials else {
            return Ok(());
        };

        let url = format!(
            "{}/api/collections/_superusers/auth-with-password",
            self.base_url
        );
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({
                "identity": creds.identity,
                "password": creds.password,
            }))
            .send()
            .await?;

        let auth: AuthResponse = Self::decode(response).await.map_err(|e| match e {
            AppError::Validation(msg) | AppError::NotFound(msg) => {
                AppError::Authentication(format!("PocketBase login failed: {}", msg))
            }
            other => other,
        })?;

        *self.token.write() = Some(auth.token);
        tracing::info!(identity = %creds.identity, "Authenticated with PocketBase");
        Ok(())
    }

    async fn ensure_auth(&self) -> Result<()> {
        if self.credentials.is_some() && self.token.read().is_none() {
            self.authenticate().await?;
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match self.token.read().as_ref() {
            Some(token) => builder.header("Authorization", token.clone()),
            None => builder,
        }
    }

    fn records_path(collection: &str) -> String {
        format!("/api/collections/{}/records", collection)
    }

    fn record_path(collection: &str, id: &str) -> Result<String> {
        if !RECORD_ID_RE.is_match(id) {
            return Err(AppError::Validation(format!(
                "Invalid {} record id: {:?}",
                collection, id
            )));
        }
        Ok(format!("/api/collections/{}/records/{}", collection, id))
    }

    /// Send a request, retrying once with a fresh token on 401
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        self.ensure_auth().await?;

        let response = build().send().await?;
        if response.status() == StatusCode::UNAUTHORIZED && self.credentials.is_some() {
            tracing::debug!("PocketBase token rejected, re-authenticating");
            *self.token.write() = None;
            self.authenticate().await?;
            return Ok(build().send().await?);
        }
        Ok(response)
    }

    /// Map a PocketBase error response into `AppError`
    async fn error_from(response: Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) if parsed.data.as_object().is_some_and(|d| !d.is_empty()) => {
                format!("{} {}", parsed.message, parsed.data)
            }
            Ok(parsed) if !parsed.message.is_empty() => parsed.message,
            _ if body.is_empty() => status.to_string(),
            _ => body,
        };

        match status {
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::BAD_REQUEST => AppError::Validation(message),
            StatusCode::UNAUTHORIZED => AppError::Authentication(message),
            StatusCode::FORBIDDEN => AppError::Authorization(message),
            _ => AppError::Upstream {
                status: status.as_u16(),
                message,
            },
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Serialization(format!("Unexpected PocketBase response: {}", e)))
    }

    /// List one page of records
    pub async fn list_records<T: DeserializeOwned>(
        &self,
        collection: &str,
        params: &ListParams,
    ) -> Result<ListResult<T>> {
        let path = Self::records_path(collection);
        tracing::debug!(collection, filter = ?params.filter, page = params.page, "PocketBase list");

        let response = self
            .send(|| self.request(Method::GET, &path).query(params))
            .await?;
        Self::decode(response).await
    }

    /// Walk every page matching `filter`
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Option<String>,
        sort: Option<String>,
    ) -> Result<Vec<T>> {
        let mut params = ListParams {
            page: 1,
            per_page: LIST_ALL_PAGE_SIZE,
            filter,
            sort,
            expand: None,
        };
        let mut items = Vec::new();

        loop {
            let page: ListResult<T> = self.list_records(collection, &params).await?;
            let done = page.items.is_empty() || i64::from(page.page) >= page.total_pages;
            items.extend(page.items);
            if done {
                break;
            }
            params.page += 1;
        }

        Ok(items)
    }

    pub async fn get_record<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T> {
        let path = Self::record_path(collection, id)?;
        let response = self.send(|| self.request(Method::GET, &path)).await?;
        Self::decode(response).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::not_found(collection, id),
            other => other,
        })
    }

    pub async fn create_record<T, B>(&self, collection: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let path = Self::records_path(collection);
        let response = self
            .send(|| self.request(Method::POST, &path).json(body))
            .await?;
        Self::decode(response).await
    }

    pub async fn update_record<T, B>(&self, collection: &str, id: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let path = Self::record_path(collection, id)?;
        let response = self
            .send(|| self.request(Method::PATCH, &path).json(body))
            .await?;
        Self::decode(response).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::not_found(collection, id),
            other => other,
        })
    }

    pub async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        let path = Self::record_path(collection, id)?;
        let response = self.send(|| self.request(Method::DELETE, &path)).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(match Self::error_from(response).await {
                AppError::NotFound(_) => AppError::not_found(collection, id),
                other => other,
            })
        }
    }

    /// `GET /api/health`
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?;
        Self::decode(response).await
    }
}
