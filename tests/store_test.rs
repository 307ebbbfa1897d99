use incident_kb::error::AppError;
use incident_kb::models::{
    generate_record_id, Incident, IncidentCategory, IncidentStatus, Lesson, LessonDraft,
    NewIncident, NewSolution, Severity, Solution,
};
use incident_kb::state::{CachedStore, IncidentFilter, InMemoryStore, KnowledgeStore, SledStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_incident(title: &str, category: IncidentCategory, severity: Severity) -> Incident {
    Incident::from_new(
        generate_record_id(),
        NewIncident {
            title: title.to_string(),
            category,
            description: format!("{} observed in production", title),
            severity,
            status: None,
            symptoms: Some("alerts firing".to_string()),
            context: None,
            environment: Some("production".to_string()),
            frequency: None,
            visibility: None,
            root_cause: None,
        },
    )
}

fn create_test_solution(incident_id: &str, title: &str) -> Solution {
    Solution::from_new(
        generate_record_id(),
        NewSolution {
            incident_id: incident_id.to_string(),
            title: title.to_string(),
            description: "Apply the fix".to_string(),
            steps: None,
            resources_needed: None,
            time_estimate: Some("15m".to_string()),
            warnings: None,
            effectiveness: Some(4),
        },
    )
}

fn create_test_lesson(incident_id: &str) -> Lesson {
    Lesson::from_draft(
        generate_record_id(),
        incident_id.to_string(),
        LessonDraft {
            title: "Watch connection pools".to_string(),
            problem: "Pool exhausted".to_string(),
            root_cause: "Leaked connections".to_string(),
            prevention: "Alert on pool saturation".to_string(),
            lesson_type: None,
        },
    )
}

async fn test_store_operations(store: Arc<dyn KnowledgeStore>) {
    // Create and read back
    let mut incident = create_test_incident(
        "Database pool exhausted",
        IncidentCategory::Data,
        Severity::High,
    );
    store.create_incident(&incident).await.unwrap();

    let fetched = store.get_incident(&incident.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Database pool exhausted");
    assert_eq!(fetched.status, IncidentStatus::Open);

    // Update
    incident.status = IncidentStatus::Resolved;
    incident.root_cause = Some("Leaked connections".to_string());
    store.update_incident(&incident).await.unwrap();
    let fetched = store.get_incident(&incident.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, IncidentStatus::Resolved);
    assert_eq!(fetched.root_cause.as_deref(), Some("Leaked connections"));

    // Solutions
    let solution = create_test_solution(&incident.id, "Raise pool size");
    store.create_solution(&solution).await.unwrap();
    let solutions = store.list_solutions(&incident.id).await.unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].title, "Raise pool size");

    // Lessons
    let lesson = create_test_lesson(&incident.id);
    store.create_lesson(&lesson).await.unwrap();
    assert_eq!(
        store.list_lessons(Some(&incident.id)).await.unwrap().len(),
        1
    );

    // Listing with filters
    let other = create_test_incident("Slow checkout", IncidentCategory::Performance, Severity::Low);
    store.create_incident(&other).await.unwrap();

    let all = store
        .list_incidents(&IncidentFilter::default(), 1, 10)
        .await
        .unwrap();
    assert_eq!(all.total_items, 2);

    let resolved = store
        .list_incidents(
            &IncidentFilter {
                statuses: vec![IncidentStatus::Resolved],
                ..Default::default()
            },
            1,
            10,
        )
        .await
        .unwrap();
    assert_eq!(resolved.total_items, 1);
    assert_eq!(resolved.items[0].id, incident.id);

    let searched = store
        .list_incidents(&IncidentFilter::with_query("CHECKOUT"), 1, 10)
        .await
        .unwrap();
    assert_eq!(searched.items.len(), 1);
    assert_eq!(searched.items[0].id, other.id);

    // Pagination
    let first = store
        .list_incidents(&IncidentFilter::default(), 1, 1)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.total_pages, 2);

    // Delete cascades to children
    store.delete_incident(&incident.id).await.unwrap();
    assert!(store.get_incident(&incident.id).await.unwrap().is_none());
    assert!(store.get_solution(&solution.id).await.unwrap().is_none());
    assert!(store.list_lessons(Some(&incident.id)).await.unwrap().is_empty());

    // Missing records
    assert!(matches!(
        store.delete_incident(&incident.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        store
            .create_solution(&create_test_solution("missing", "Orphan"))
            .await,
        Err(AppError::NotFound(_))
    ));

    store.health_check().await.unwrap();
}

#[tokio::test]
async fn test_in_memory_store() {
    let store: Arc<dyn KnowledgeStore> = Arc::new(InMemoryStore::new());
    assert_eq!(store.backend_name(), "memory");
    test_store_operations(store).await;
}

#[tokio::test]
async fn test_sled_store() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn KnowledgeStore> = Arc::new(SledStore::new(temp_dir.path()).unwrap());
    test_store_operations(store).await;
}

#[tokio::test]
async fn test_cached_store() {
    let inner: Arc<dyn KnowledgeStore> = Arc::new(InMemoryStore::new());
    let store: Arc<dyn KnowledgeStore> =
        Arc::new(CachedStore::new(inner, 100, Duration::from_secs(60)));
    test_store_operations(store).await;
}

#[tokio::test]
async fn test_sled_store_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let incident = create_test_incident("Cert expired", IncidentCategory::Security, Severity::Critical);

    {
        let store = SledStore::new(temp_dir.path()).unwrap();
        store.create_incident(&incident).await.unwrap();
        store
            .create_solution(&create_test_solution(&incident.id, "Renew cert"))
            .await
            .unwrap();
        store.flush().await.unwrap();
    }

    let reopened = SledStore::new(temp_dir.path()).unwrap();
    let fetched = reopened.get_incident(&incident.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Cert expired");
    assert_eq!(fetched.severity, Severity::Critical);
    assert_eq!(reopened.list_solutions(&incident.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cached_store_sees_writes() {
    let inner: Arc<dyn KnowledgeStore> = Arc::new(InMemoryStore::new());
    let store = CachedStore::new(inner, 100, Duration::from_secs(60));

    let mut incident = create_test_incident("Queue backlog", IncidentCategory::Infrastructure, Severity::Medium);
    store.create_incident(&incident).await.unwrap();

    // Warm the caches
    store.get_incident(&incident.id).await.unwrap();
    store
        .list_incidents(&IncidentFilter::default(), 1, 10)
        .await
        .unwrap();

    incident.status = IncidentStatus::Investigating;
    store.update_incident(&incident).await.unwrap();

    let fetched = store.get_incident(&incident.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, IncidentStatus::Investigating);

    let page = store
        .list_incidents(
            &IncidentFilter {
                statuses: vec![IncidentStatus::Investigating],
                ..Default::default()
            },
            1,
            10,
        )
        .await
        .unwrap();
    assert_eq!(page.total_items, 1);
}
