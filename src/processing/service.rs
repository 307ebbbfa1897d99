use crate::error::{AppError, Result};
use crate::export::{self, ExportRequest, RenderedExport};
use crate::metrics::{
    INCIDENTS_TOTAL, INCIDENT_STATUS_CHANGES_TOTAL, KNOWLEDGE_EXPORTS_TOTAL,
    LESSONS_EXTRACTED_TOTAL, SOLUTIONS_TOTAL,
};
use crate::models::{
    generate_record_id, Incident, IncidentPatch, IncidentStatus, KnowledgeEntry,
    KnowledgeExport, KnowledgeStats, Lesson, LessonDraft, LessonType, NewIncident, NewSolution,
    Solution, SolutionPatch,
};
use crate::pocketbase::collections;
use crate::state::{IncidentFilter, KnowledgeStore, Page};
use crate::websocket::EventHandlers;
use futures::future::try_join_all;
use std::sync::Arc;
use validator::Validate;

/// Largest page a caller may request
pub const MAX_PER_PAGE: u32 = 100;

/// Search result count when the caller gives none
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Page size used when scanning every matching incident
const SCAN_PAGE_SIZE: u32 = 100;

const MAX_TITLE_CHARS: usize = 200;

/// Knowledge-base operations shared by the REST API, MCP tools and CLI
pub struct KnowledgeService {
    store: Arc<dyn KnowledgeStore>,
    websocket_handlers: Option<EventHandlers>,
}

impl KnowledgeService {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            store,
            websocket_handlers: None,
        }
    }

    /// Publish changes to WebSocket subscribers
    pub fn with_event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.websocket_handlers = Some(handlers);
        self
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Incidents
    // ------------------------------------------------------------------

    /// Validate and persist a new incident
    pub async fn create_incident(&self, new: NewIncident) -> Result<Incident> {
        new.validate()?;
        require_text("title", &new.title)?;
        require_text("description", &new.description)?;

        let incident = Incident::from_new(generate_record_id(), new);
        let incident = self.store.create_incident(&incident).await?;

        INCIDENTS_TOTAL
            .with_label_values(&[
                incident.severity.to_string().as_str(),
                incident.category.to_string().as_str(),
            ])
            .inc();

        tracing::info!(
            incident_id = %incident.id,
            severity = %incident.severity,
            category = %incident.category,
            "Created incident"
        );

        if let Some(ref ws) = self.websocket_handlers {
            ws.incidents.on_incident_created(incident.clone());
        }

        Ok(incident)
    }

    pub async fn get_incident(&self, id: &str) -> Result<Incident> {
        self.store
            .get_incident(id)
            .await?
            .ok_or_else(|| AppError::not_found(collections::INCIDENTS, id))
    }

    /// Incident together with its solutions and lessons
    pub async fn get_incident_details(&self, id: &str) -> Result<KnowledgeEntry> {
        let incident = self.get_incident(id).await?;
        self.load_entry(incident).await
    }

    /// Apply a partial update
    pub async fn update_incident(&self, id: &str, patch: IncidentPatch) -> Result<Incident> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        let mut incident = self.get_incident(id).await?;
        let previous_status = incident.apply_patch(patch);
        let incident = self.store.update_incident(&incident).await?;

        if let Some(previous) = previous_status {
            INCIDENT_STATUS_CHANGES_TOTAL
                .with_label_values(&[
                    previous.to_string().as_str(),
                    incident.status.to_string().as_str(),
                ])
                .inc();
            tracing::info!(
                incident_id = %id,
                from = %previous,
                to = %incident.status,
                "Incident status changed"
            );
        } else {
            tracing::debug!(incident_id = %id, "Updated incident");
        }

        if let Some(ref ws) = self.websocket_handlers {
            ws.incidents
                .on_incident_updated(incident.clone(), previous_status);
        }

        Ok(incident)
    }

    pub async fn update_incident_status(
        &self,
        id: &str,
        status: IncidentStatus,
    ) -> Result<Incident> {
        self.update_incident(id, IncidentPatch::status(status)).await
    }

    /// Delete an incident and everything attached to it
    pub async fn delete_incident(&self, id: &str) -> Result<()> {
        let incident = self.get_incident(id).await?;
        self.store.delete_incident(id).await?;

        tracing::info!(incident_id = %id, "Deleted incident");

        if let Some(ref ws) = self.websocket_handlers {
            ws.incidents.on_incident_deleted(incident);
        }
        Ok(())
    }

    /// One page of incidents; `per_page` is capped at [`MAX_PER_PAGE`]
    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Incident>> {
        self.store
            .list_incidents(filter, page.max(1), per_page.clamp(1, MAX_PER_PAGE))
            .await
    }

    /// Case-insensitive substring search over title and description
    pub async fn search_incidents(&self, query: &str, limit: Option<u32>) -> Result<Vec<Incident>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation(
                "Search query must not be empty".to_string(),
            ));
        }

        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_PER_PAGE);
        let page = self
            .store
            .list_incidents(&IncidentFilter::with_query(query), 1, limit)
            .await?;

        tracing::debug!(query = %query, hits = page.items.len(), "Searched incidents");
        Ok(page.items)
    }

    // ------------------------------------------------------------------
    // Solutions
    // ------------------------------------------------------------------

    /// Attach a solution; the incident must exist
    pub async fn add_solution(&self, new: NewSolution) -> Result<Solution> {
        new.validate()?;
        require_text("title", &new.title)?;

        let incident = self.get_incident(&new.incident_id).await?;
        let solution = Solution::from_new(generate_record_id(), new);
        let solution = self.store.create_solution(&solution).await?;

        SOLUTIONS_TOTAL.inc();
        tracing::info!(
            incident_id = %incident.id,
            solution_id = %solution.id,
            "Added solution"
        );

        if let Some(ref ws) = self.websocket_handlers {
            ws.knowledge.on_solution_added(incident, solution.clone());
        }

        Ok(solution)
    }

    pub async fn get_solution(&self, id: &str) -> Result<Solution> {
        self.store
            .get_solution(id)
            .await?
            .ok_or_else(|| AppError::not_found(collections::SOLUTIONS, id))
    }

    pub async fn list_solutions(&self, incident_id: &str) -> Result<Vec<Solution>> {
        self.get_incident(incident_id).await?;
        self.store.list_solutions(incident_id).await
    }

    pub async fn update_solution(&self, id: &str, patch: SolutionPatch) -> Result<Solution> {
        patch.validate()?;
        let mut solution = self.get_solution(id).await?;
        solution.apply_patch(patch);
        self.store.update_solution(&solution).await
    }

    pub async fn delete_solution(&self, id: &str) -> Result<()> {
        self.get_solution(id).await?;
        self.store.delete_solution(id).await
    }

    // ------------------------------------------------------------------
    // Lessons
    // ------------------------------------------------------------------

    pub async fn list_lessons(&self, incident_id: Option<&str>) -> Result<Vec<Lesson>> {
        self.store.list_lessons(incident_id).await
    }

    /// Record lessons for an incident.
    ///
    /// With a draft, the draft is stored as given (its type defaulting from the
    /// incident category). Without one, a lesson is derived from the incident
    /// and its recorded solutions.
    pub async fn extract_lessons(
        &self,
        incident_id: &str,
        draft: Option<LessonDraft>,
    ) -> Result<Vec<Lesson>> {
        let incident = self.get_incident(incident_id).await?;

        let (draft, mode) = match draft {
            Some(draft) => {
                draft.validate()?;
                require_text("title", &draft.title)?;
                (draft, "explicit")
            }
            None => {
                let solutions = self.store.list_solutions(incident_id).await?;
                (derive_lesson(&incident, &solutions), "derived")
            }
        };

        let mut draft = draft;
        draft.lesson_type = draft
            .lesson_type
            .or_else(|| Some(LessonType::for_category(incident.category)));

        let lesson = Lesson::from_draft(generate_record_id(), incident.id.clone(), draft);
        let lesson = self.store.create_lesson(&lesson).await?;

        LESSONS_EXTRACTED_TOTAL.with_label_values(&[mode]).inc();
        tracing::info!(
            incident_id = %incident.id,
            lesson_id = %lesson.id,
            mode = mode,
            "Extracted lesson"
        );

        let lessons = vec![lesson];
        if let Some(ref ws) = self.websocket_handlers {
            ws.knowledge.on_lessons_extracted(incident, lessons.clone());
        }

        Ok(lessons)
    }

    // ------------------------------------------------------------------
    // Export & stats
    // ------------------------------------------------------------------

    /// Assemble the denormalized knowledge projection for matching incidents
    pub async fn build_export(&self, request: &ExportRequest) -> Result<KnowledgeExport> {
        let incidents = self.collect_incidents(&request.filter, request.limit).await?;
        let entries = try_join_all(incidents.into_iter().map(|i| self.load_entry(i))).await?;

        Ok(KnowledgeExport::new(request.filter.describe(), entries))
    }

    /// Build and render an export
    pub async fn export_knowledge(&self, request: ExportRequest) -> Result<RenderedExport> {
        let export = self.build_export(&request).await?;
        let rendered = export::render(&export, request.format)?;

        KNOWLEDGE_EXPORTS_TOTAL
            .with_label_values(&[request.format.to_string().as_str()])
            .inc();
        tracing::info!(
            format = %request.format,
            incidents = export.total_incidents,
            solutions = export.total_solutions,
            lessons = export.total_lessons,
            "Exported knowledge"
        );

        Ok(rendered)
    }

    /// Incident totals by status, severity and category
    pub async fn stats(&self) -> Result<KnowledgeStats> {
        let all = IncidentFilter::default();
        let (incidents, lessons) = tokio::try_join!(
            self.collect_incidents(&all, None),
            self.store.list_lessons(None),
        )?;

        let mut stats = KnowledgeStats::default();
        for incident in &incidents {
            stats.record(incident);
        }
        stats.total_lessons = lessons.len() as u64;
        Ok(stats)
    }

    async fn load_entry(&self, incident: Incident) -> Result<KnowledgeEntry> {
        let (solutions, lessons) = tokio::try_join!(
            self.store.list_solutions(&incident.id),
            self.store.list_lessons(Some(&incident.id)),
        )?;
        Ok(KnowledgeEntry {
            incident,
            solutions,
            lessons,
        })
    }

    /// Walk every page of a listing, stopping early at `limit`
    async fn collect_incidents(
        &self,
        filter: &IncidentFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Incident>> {
        let mut incidents = Vec::new();
        let mut page = 1;

        loop {
            let result = self
                .store
                .list_incidents(filter, page, SCAN_PAGE_SIZE)
                .await?;
            let last_page = result.items.is_empty() || page >= result.total_pages;
            incidents.extend(result.items);

            if let Some(limit) = limit {
                if incidents.len() >= limit {
                    incidents.truncate(limit);
                    break;
                }
            }
            if last_page {
                break;
            }
            page += 1;
        }

        Ok(incidents)
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be blank", field)));
    }
    Ok(())
}

/// Lesson content inferred from an incident and its solutions
fn derive_lesson(incident: &Incident, solutions: &[Solution]) -> LessonDraft {
    let title: String = format!("Lessons from: {}", incident.title)
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();

    let mut problem = incident.description.trim().to_string();
    if let Some(symptoms) = incident.symptoms.as_deref().map(str::trim) {
        if !symptoms.is_empty() {
            problem.push_str("\n\nSymptoms: ");
            problem.push_str(symptoms);
        }
    }

    let root_cause = incident
        .root_cause
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("Undetermined")
        .to_string();

    let prevention = if solutions.is_empty() {
        "No solutions recorded yet".to_string()
    } else {
        solutions
            .iter()
            .map(|solution| {
                let steps = solution.steps_list();
                if steps.is_empty() {
                    format!("- {}", solution.title)
                } else {
                    format!("- {}: {}", solution.title, steps.join("; "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    LessonDraft {
        title,
        problem,
        root_cause,
        prevention,
        lesson_type: Some(LessonType::for_category(incident.category)),
    }
}
