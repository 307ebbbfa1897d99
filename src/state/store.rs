use crate::error::{AppError, Result};
use crate::models::{Incident, Lesson, Solution};
use crate::pocketbase::collections;
use crate::state::{IncidentFilter, KnowledgeStore, Page};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory knowledge store (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryStore {
    incidents: Arc<DashMap<String, Incident>>,
    solutions: Arc<DashMap<String, Solution>>,
    lessons: Arc<DashMap<String, Lesson>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn create_incident(&self, incident: &Incident) -> Result<Incident> {
        if self.incidents.contains_key(&incident.id) {
            return Err(AppError::Validation(format!(
                "Incident {} already exists",
                incident.id
            )));
        }
        self.incidents.insert(incident.id.clone(), incident.clone());
        tracing::debug!(incident_id = %incident.id, "Incident saved");
        Ok(incident.clone())
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        Ok(self.incidents.get(id).map(|entry| entry.clone()))
    }

    async fn update_incident(&self, incident: &Incident) -> Result<Incident> {
        match self.incidents.get_mut(&incident.id) {
            Some(mut entry) => {
                *entry = incident.clone();
                tracing::debug!(incident_id = %incident.id, "Incident updated");
                Ok(incident.clone())
            }
            None => Err(AppError::not_found(collections::INCIDENTS, &incident.id)),
        }
    }

    async fn delete_incident(&self, id: &str) -> Result<()> {
        if self.incidents.remove(id).is_none() {
            return Err(AppError::not_found(collections::INCIDENTS, id));
        }
        self.solutions.retain(|_, s| s.incident_id != id);
        self.lessons.retain(|_, l| l.incident_id != id);
        tracing::debug!(incident_id = %id, "Incident deleted");
        Ok(())
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Incident>> {
        let mut incidents: Vec<Incident> = self
            .incidents
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        filter.sort.sort(&mut incidents);
        Ok(Page::paginate(incidents, page, per_page))
    }

    async fn create_solution(&self, solution: &Solution) -> Result<Solution> {
        if !self.incidents.contains_key(&solution.incident_id) {
            return Err(AppError::not_found(
                collections::INCIDENTS,
                &solution.incident_id,
            ));
        }
        self.solutions.insert(solution.id.clone(), solution.clone());
        Ok(solution.clone())
    }

    async fn get_solution(&self, id: &str) -> Result<Option<Solution>> {
        Ok(self.solutions.get(id).map(|entry| entry.clone()))
    }

    async fn list_solutions(&self, incident_id: &str) -> Result<Vec<Solution>> {
        let mut solutions: Vec<Solution> = self
            .solutions
            .iter()
            .filter(|entry| entry.incident_id == incident_id)
            .map(|entry| entry.value().clone())
            .collect();
        solutions.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(solutions)
    }

    async fn update_solution(&self, solution: &Solution) -> Result<Solution> {
        match self.solutions.get_mut(&solution.id) {
            Some(mut entry) => {
                *entry = solution.clone();
                Ok(solution.clone())
            }
            None => Err(AppError::not_found(collections::SOLUTIONS, &solution.id)),
        }
    }

    async fn delete_solution(&self, id: &str) -> Result<()> {
        self.solutions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(collections::SOLUTIONS, id))
    }

    async fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        if !self.incidents.contains_key(&lesson.incident_id) {
            return Err(AppError::not_found(
                collections::INCIDENTS,
                &lesson.incident_id,
            ));
        }
        self.lessons.insert(lesson.id.clone(), lesson.clone());
        Ok(lesson.clone())
    }

    async fn list_lessons(&self, incident_id: Option<&str>) -> Result<Vec<Lesson>> {
        let mut lessons: Vec<Lesson> = self
            .lessons
            .iter()
            .filter(|entry| incident_id.map_or(true, |id| entry.incident_id == id))
            .map(|entry| entry.value().clone())
            .collect();
        lessons.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(lessons)
    }

    async fn delete_lesson(&self, id: &str) -> Result<()> {
        self.lessons
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(collections::LESSONS, id))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        generate_record_id, IncidentCategory, IncidentStatus, LessonDraft, NewIncident,
        NewSolution, Severity,
    };

    fn incident(title: &str, severity: Severity) -> Incident {
        Incident::from_new(
            generate_record_id(),
            NewIncident {
                title: title.to_string(),
                category: IncidentCategory::Bug,
                description: format!("{} description", title),
                severity,
                status: None,
                symptoms: None,
                context: None,
                environment: None,
                frequency: None,
                visibility: None,
                root_cause: None,
            },
        )
    }

    fn solution(incident_id: &str) -> Solution {
        Solution::from_new(
            generate_record_id(),
            NewSolution {
                incident_id: incident_id.to_string(),
                title: "Restart".to_string(),
                description: String::new(),
                steps: None,
                resources_needed: None,
                time_estimate: None,
                warnings: None,
                effectiveness: None,
            },
        )
    }

    #[tokio::test]
    async fn test_crud_incident() {
        let store = InMemoryStore::new();
        let mut incident = incident("Memory leak", Severity::High);

        store.create_incident(&incident).await.unwrap();
        let fetched = store.get_incident(&incident.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Memory leak");

        incident.status = IncidentStatus::Resolved;
        store.update_incident(&incident).await.unwrap();
        let fetched = store.get_incident(&incident.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, IncidentStatus::Resolved);

        store.delete_incident(&incident.id).await.unwrap();
        assert!(store.get_incident(&incident.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_incident_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.delete_incident("missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = InMemoryStore::new();
        let incident = incident("Cascade", Severity::Low);
        store.create_incident(&incident).await.unwrap();

        let solution = solution(&incident.id);
        store.create_solution(&solution).await.unwrap();
        let lesson = Lesson::from_draft(
            generate_record_id(),
            incident.id.clone(),
            LessonDraft {
                title: "Lesson".to_string(),
                problem: String::new(),
                root_cause: String::new(),
                prevention: String::new(),
                lesson_type: None,
            },
        );
        store.create_lesson(&lesson).await.unwrap();

        store.delete_incident(&incident.id).await.unwrap();

        assert!(store.get_solution(&solution.id).await.unwrap().is_none());
        assert!(store.list_lessons(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_solution_requires_incident() {
        let store = InMemoryStore::new();
        let result = store.create_solution(&solution("nope")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_with_filter() {
        let store = InMemoryStore::new();
        store
            .create_incident(&incident("Disk full", Severity::Critical))
            .await
            .unwrap();
        store
            .create_incident(&incident("Slow query", Severity::Low))
            .await
            .unwrap();

        let filter = IncidentFilter {
            severities: vec![Severity::Critical],
            ..Default::default()
        };
        let page = store.list_incidents(&filter, 1, 10).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].title, "Disk full");

        let page = store
            .list_incidents(&IncidentFilter::with_query("QUERY"), 1, 10)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Slow query");
    }
}
