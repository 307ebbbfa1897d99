use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::export::{ExportFormat, ExportRequest};
use crate::models::*;
use crate::processing::DEFAULT_SEARCH_LIMIT;
use crate::state::{IncidentFilter, IncidentSort, Page};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Liveness endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.service.store().backend_name().to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub uptime_seconds: u64,
}

/// Readiness endpoint; also pings the storage backend
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    let store = state.service.store();
    match store.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "ready",
            "backend": store.backend_name(),
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, backend = store.backend_name(), "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unavailable",
                    "backend": store.backend_name(),
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

// ----------------------------------------------------------------------
// Incidents
// ----------------------------------------------------------------------

/// Comma-separated filter values as they arrive in query strings
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub sort: Option<IncidentSort>,
}

impl FilterQuery {
    fn to_filter(&self) -> Result<IncidentFilter> {
        Ok(IncidentFilter {
            query: self
                .q
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
            statuses: parse_list("status", self.status.as_deref())?,
            severities: parse_list("severity", self.severity.as_deref())?,
            categories: parse_list("category", self.category.as_deref())?,
            sort: self.sort.unwrap_or_default(),
        })
    }
}

fn parse_list<T>(field: &str, raw: Option<&str>) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| AppError::Validation(format!("Invalid {} '{}': {}", field, v, e)))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct ListIncidentsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(flatten)]
    pub filter: FilterQuery,
}

/// List incidents
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(params): Query<ListIncidentsQuery>,
) -> Result<Json<Page<Incident>>> {
    let filter = params.filter.to_filter()?;
    let page = state
        .service
        .list_incidents(
            &filter,
            params.page.unwrap_or(1),
            params.per_page.unwrap_or(20),
        )
        .await?;
    Ok(Json(page))
}

/// Create an incident
pub async fn create_incident(
    State(state): State<AppState>,
    Json(request): Json<NewIncident>,
) -> Result<(StatusCode, Json<Incident>)> {
    let created = state.service.create_incident(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub total: usize,
    pub incidents: Vec<Incident>,
}

/// Case-insensitive search over title and description
pub async fn search_incidents(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let incidents = state
        .service
        .search_incidents(&params.q, Some(params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)))
        .await?;
    Ok(Json(SearchResponse {
        query: params.q.trim().to_string(),
        total: incidents.len(),
        incidents,
    }))
}

/// Get an incident with its solutions and lessons
pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<KnowledgeEntry>> {
    Ok(Json(state.service.get_incident_details(&id).await?))
}

pub async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<IncidentPatch>,
) -> Result<Json<Incident>> {
    Ok(Json(state.service.update_incident(&id, patch).await?))
}

pub async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete_incident(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------
// Solutions
// ----------------------------------------------------------------------

pub async fn list_solutions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Solution>>> {
    Ok(Json(state.service.list_solutions(&id).await?))
}

/// Solution body posted under `/api/incidents/:id/solutions`; the path supplies the incident
#[derive(Debug, Deserialize)]
pub struct AddSolutionRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub steps: Option<StepsInput>,
    pub resources_needed: Option<String>,
    pub time_estimate: Option<String>,
    pub warnings: Option<String>,
    pub effectiveness: Option<u8>,
}

/// Add a solution; 404 when the incident does not exist
pub async fn add_solution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddSolutionRequest>,
) -> Result<(StatusCode, Json<Solution>)> {
    let solution = state
        .service
        .add_solution(NewSolution {
            incident_id: id,
            title: request.title,
            description: request.description,
            steps: request.steps,
            resources_needed: request.resources_needed,
            time_estimate: request.time_estimate,
            warnings: request.warnings,
            effectiveness: request.effectiveness,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(solution)))
}

pub async fn get_solution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Solution>> {
    Ok(Json(state.service.get_solution(&id).await?))
}

pub async fn update_solution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<SolutionPatch>,
) -> Result<Json<Solution>> {
    Ok(Json(state.service.update_solution(&id, patch).await?))
}

pub async fn delete_solution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete_solution(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------
// Lessons
// ----------------------------------------------------------------------

/// Optional explicit lesson; an empty body derives one from the incident
#[derive(Debug, Default, Deserialize)]
pub struct ExtractLessonsRequest {
    pub lesson: Option<LessonDraft>,
}

pub async fn extract_lessons(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Vec<Lesson>>)> {
    // No body derives lessons; a body that is present must be valid
    let draft = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<ExtractLessonsRequest>(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?
            .lesson
    };
    let lessons = state.service.extract_lessons(&id, draft).await?;
    Ok((StatusCode::CREATED, Json(lessons)))
}

#[derive(Debug, Deserialize)]
pub struct LessonsQuery {
    pub incident_id: Option<String>,
}

pub async fn list_lessons(
    State(state): State<AppState>,
    Query(params): Query<LessonsQuery>,
) -> Result<Json<Vec<Lesson>>> {
    Ok(Json(
        state
            .service
            .list_lessons(params.incident_id.as_deref())
            .await?,
    ))
}

// ----------------------------------------------------------------------
// Knowledge
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub limit: Option<usize>,
    #[serde(flatten)]
    pub filter: FilterQuery,
}

/// Download an export with the right content type and attachment name
pub async fn export_knowledge(
    State(state): State<AppState>,
    Query(params): Query<ExportQuery>,
) -> Result<Response> {
    let format = match params.format.as_deref() {
        Some(raw) => raw
            .parse::<ExportFormat>()
            .map_err(|_| AppError::Validation(format!("Unsupported export format '{}'", raw)))?,
        None => ExportFormat::default(),
    };

    let rendered = state
        .service
        .export_knowledge(ExportRequest {
            format,
            filter: params.filter.to_filter()?,
            limit: params.limit,
        })
        .await?;

    let disposition = format!("attachment; filename=\"{}\"", rendered.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        rendered.body,
    )
        .into_response())
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<KnowledgeStats>> {
    Ok(Json(state.service.stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_query_parsing() {
        let query = FilterQuery {
            q: Some("  redis ".to_string()),
            status: Some("open, resolved".to_string()),
            severity: Some("CRITICAL".to_string()),
            category: None,
            sort: None,
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.query.as_deref(), Some("redis"));
        assert_eq!(
            filter.statuses,
            vec![IncidentStatus::Open, IncidentStatus::Resolved]
        );
        assert_eq!(filter.severities, vec![Severity::Critical]);
        assert!(filter.categories.is_empty());
    }

    #[test]
    fn test_filter_query_rejects_unknown_values() {
        let query = FilterQuery {
            status: Some("closed".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.to_filter(), Err(AppError::Validation(_))));
    }
}
