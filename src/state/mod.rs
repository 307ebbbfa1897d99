pub mod cache;
pub mod cached;
pub mod factory;
pub mod pocketbase_store;
pub mod sled_store;
pub mod store;

pub use cache::*;
pub use cached::CachedStore;
pub use factory::{create_in_memory_store, create_store};
pub use pocketbase_store::PocketBaseStore;
pub use sled_store::SledStore;
pub use store::*;

use crate::error::Result;
use crate::models::{
    Incident, IncidentCategory, IncidentStatus, Lesson, Severity, Solution,
};
use crate::pocketbase::Filter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for knowledge-base storage operations
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persist a new incident and return the stored record
    async fn create_incident(&self, incident: &Incident) -> Result<Incident>;

    /// Get an incident by ID
    async fn get_incident(&self, id: &str) -> Result<Option<Incident>>;

    /// Replace an existing incident
    async fn update_incident(&self, incident: &Incident) -> Result<Incident>;

    /// Delete an incident together with its solutions and lessons
    async fn delete_incident(&self, id: &str) -> Result<()>;

    /// List incidents with filtering; `page` is 1-based
    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Incident>>;

    async fn create_solution(&self, solution: &Solution) -> Result<Solution>;

    async fn get_solution(&self, id: &str) -> Result<Option<Solution>>;

    /// Solutions for one incident, oldest first
    async fn list_solutions(&self, incident_id: &str) -> Result<Vec<Solution>>;

    async fn update_solution(&self, solution: &Solution) -> Result<Solution>;

    async fn delete_solution(&self, id: &str) -> Result<()>;

    async fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson>;

    /// Lessons, optionally restricted to one incident, oldest first
    async fn list_lessons(&self, incident_id: Option<&str>) -> Result<Vec<Lesson>>;

    async fn delete_lesson(&self, id: &str) -> Result<()>;

    /// Backend reachability check used by readiness probes
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

/// Sort order for incident listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSort {
    #[default]
    Newest,
    Oldest,
    RecentlyUpdated,
}

impl IncidentSort {
    /// PocketBase `sort` parameter
    pub fn as_pocketbase(&self) -> &'static str {
        match self {
            IncidentSort::Newest => "-created",
            IncidentSort::Oldest => "created",
            IncidentSort::RecentlyUpdated => "-updated",
        }
    }

    pub fn sort(&self, incidents: &mut [Incident]) {
        match self {
            IncidentSort::Newest => incidents.sort_by(|a, b| b.created.cmp(&a.created)),
            IncidentSort::Oldest => incidents.sort_by(|a, b| a.created.cmp(&b.created)),
            IncidentSort::RecentlyUpdated => incidents.sort_by(|a, b| b.updated.cmp(&a.updated)),
        }
    }
}

/// Filter for querying incidents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentFilter {
    /// Case-insensitive substring over title and description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<IncidentStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severities: Vec<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<IncidentCategory>,
    #[serde(default)]
    pub sort: IncidentSort,
}

impl IncidentFilter {
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Evaluate the filter locally (memory and sled backends)
    pub fn matches(&self, incident: &Incident) -> bool {
        let query_match = self
            .query
            .as_deref()
            .map_or(true, |q| incident.matches_query(q));

        let status_match = self.statuses.is_empty() || self.statuses.contains(&incident.status);

        let severity_match =
            self.severities.is_empty() || self.severities.contains(&incident.severity);

        let category_match =
            self.categories.is_empty() || self.categories.contains(&incident.category);

        query_match && status_match && severity_match && category_match
    }

    /// Translate into a PocketBase filter expression
    pub fn to_pocketbase(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(query) = &self.query {
            filter = filter.contains_any(&["title", "description"], query);
        }
        filter
            .any_of("status", &self.statuses)
            .any_of("severity", &self.severities)
            .any_of("category", &self.categories)
    }

    /// Stable string form, used as the query cache key
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// One-line description for export headers
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(q) = &self.query {
            parts.push(format!("query=\"{}\"", q));
        }
        if !self.statuses.is_empty() {
            parts.push(format!("status={}", join(&self.statuses)));
        }
        if !self.severities.is_empty() {
            parts.push(format!("severity={}", join(&self.severities)));
        }
        if !self.categories.is_empty() {
            parts.push(format!("category={}", join(&self.categories)));
        }
        if parts.is_empty() {
            "all incidents".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn join<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Slice an already filtered and sorted collection
    pub fn paginate(all: Vec<T>, page: u32, per_page: u32) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total_items = all.len() as u64;
        let total_pages = total_items.div_ceil(per_page as u64) as u32;
        let start = ((page - 1) as usize).saturating_mul(per_page as usize);

        Self {
            items: all
                .into_iter()
                .skip(start)
                .take(per_page as usize)
                .collect(),
            page,
            per_page,
            total_items,
            total_pages,
        }
    }
}
