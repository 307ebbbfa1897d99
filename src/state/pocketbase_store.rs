use crate::error::{AppError, Result};
use crate::models::{Incident, Lesson, Solution};
use crate::pocketbase::{collections, Filter, ListParams, ListResult, PocketBaseClient};
use crate::state::{IncidentFilter, KnowledgeStore, Page};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Knowledge store backed by a PocketBase instance
#[derive(Clone)]
pub struct PocketBaseStore {
    client: Arc<PocketBaseClient>,
}

impl PocketBaseStore {
    pub fn new(client: Arc<PocketBaseClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &PocketBaseClient {
        &self.client
    }

    /// Record body for create/update: server-managed timestamps and unset fields dropped
    fn body<T: Serialize>(record: &T, keep_id: bool) -> Result<Value> {
        let mut value = serde_json::to_value(record)?;
        if let Value::Object(map) = &mut value {
            map.remove("created");
            map.remove("updated");
            if !keep_id {
                map.remove("id");
            }
            map.retain(|_, v| !v.is_null());
        }
        Ok(value)
    }

    /// Treat a 404 as an absent record
    fn optional<T>(result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(record) => Ok(Some(record)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn by_incident(incident_id: &str) -> Option<String> {
        Filter::new().eq("incident_id", incident_id).build()
    }

    async fn delete_children(&self, collection: &str, incident_id: &str) -> Result<usize> {
        let children: Vec<Value> = self
            .client
            .list_all(collection, Self::by_incident(incident_id), None)
            .await?;

        let mut deleted = 0;
        for child in &children {
            if let Some(id) = child.get("id").and_then(Value::as_str) {
                match self.client.delete_record(collection, id).await {
                    Ok(()) | Err(AppError::NotFound(_)) => deleted += 1,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl KnowledgeStore for PocketBaseStore {
    async fn create_incident(&self, incident: &Incident) -> Result<Incident> {
        let body = Self::body(incident, true)?;
        let created: Incident = self
            .client
            .create_record(collections::INCIDENTS, &body)
            .await?;
        tracing::debug!(incident_id = %created.id, "Incident saved to PocketBase");
        Ok(created)
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        Self::optional(self.client.get_record(collections::INCIDENTS, id).await)
    }

    async fn update_incident(&self, incident: &Incident) -> Result<Incident> {
        let body = Self::body(incident, false)?;
        self.client
            .update_record(collections::INCIDENTS, &incident.id, &body)
            .await
    }

    async fn delete_incident(&self, id: &str) -> Result<()> {
        if self.get_incident(id).await?.is_none() {
            return Err(AppError::not_found(collections::INCIDENTS, id));
        }

        let solutions = self.delete_children(collections::SOLUTIONS, id).await?;
        let lessons = self.delete_children(collections::LESSONS, id).await?;
        self.client.delete_record(collections::INCIDENTS, id).await?;

        tracing::debug!(incident_id = %id, solutions, lessons, "Incident deleted from PocketBase");
        Ok(())
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Incident>> {
        let params = ListParams {
            page: page.max(1),
            per_page: per_page.max(1),
            filter: filter.to_pocketbase().build(),
            sort: Some(filter.sort.as_pocketbase().to_string()),
            expand: None,
        };

        let result: ListResult<Incident> = self
            .client
            .list_records(collections::INCIDENTS, &params)
            .await?;

        Ok(Page {
            items: result.items,
            page: result.page,
            per_page: result.per_page,
            total_items: result.total_items.max(0) as u64,
            total_pages: result.total_pages.max(0) as u32,
        })
    }

    async fn create_solution(&self, solution: &Solution) -> Result<Solution> {
        let body = Self::body(solution, true)?;
        self.client
            .create_record(collections::SOLUTIONS, &body)
            .await
    }

    async fn get_solution(&self, id: &str) -> Result<Option<Solution>> {
        Self::optional(self.client.get_record(collections::SOLUTIONS, id).await)
    }

    async fn list_solutions(&self, incident_id: &str) -> Result<Vec<Solution>> {
        self.client
            .list_all(
                collections::SOLUTIONS,
                Self::by_incident(incident_id),
                Some("created".to_string()),
            )
            .await
    }

    async fn update_solution(&self, solution: &Solution) -> Result<Solution> {
        let body = Self::body(solution, false)?;
        self.client
            .update_record(collections::SOLUTIONS, &solution.id, &body)
            .await
    }

    async fn delete_solution(&self, id: &str) -> Result<()> {
        self.client.delete_record(collections::SOLUTIONS, id).await
    }

    async fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        let body = Self::body(lesson, true)?;
        self.client.create_record(collections::LESSONS, &body).await
    }

    async fn list_lessons(&self, incident_id: Option<&str>) -> Result<Vec<Lesson>> {
        self.client
            .list_all(
                collections::LESSONS,
                incident_id.and_then(Self::by_incident),
                Some("created".to_string()),
            )
            .await
    }

    async fn delete_lesson(&self, id: &str) -> Result<()> {
        self.client.delete_record(collections::LESSONS, id).await
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health().await.map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "pocketbase"
    }
}
