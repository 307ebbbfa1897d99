use incident_kb::agent::{self, catalog, DetailLevel, FeedbackStore, ToolPayload, ToolRouter};
use incident_kb::config::{AgentConfig, RouteKind};
use incident_kb::error::AppError;
use incident_kb::mcp::tools;
use incident_kb::processing::KnowledgeService;
use incident_kb::state::InMemoryStore;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn agent_config(dir: &Path) -> AgentConfig {
    AgentConfig {
        audit_path: dir.join("agent/audit.jsonl"),
        feedback_path: dir.join("agent/feedback.json"),
        ..Default::default()
    }
}

fn router_with(config: &AgentConfig) -> ToolRouter {
    let service = Arc::new(KnowledgeService::new(Arc::new(InMemoryStore::new())));
    agent::build_router(service, config)
}

fn complete(payload: ToolPayload) -> Value {
    match payload {
        ToolPayload::Complete(value) => value,
        other => panic!("expected a complete payload, got {:?}", other),
    }
}

async fn create(router: &ToolRouter, title: &str) -> String {
    let output = router
        .call(
            tools::CREATE_INCIDENT,
            json!({
                "title": title,
                "category": "infrastructure",
                "description": format!("{} on the edge nodes", title),
                "severity": "high",
            }),
        )
        .await
        .unwrap();
    complete(output.result)["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_writes_invalidate_cached_reads() {
    let dir = TempDir::new().unwrap();
    let router = router_with(&agent_config(dir.path()));
    let id = create(&router, "TLS handshake failures").await;

    let search = json!({ "query": "handshake" });
    let first = router
        .call(tools::SEARCH_INCIDENTS, search.clone())
        .await
        .unwrap();
    let cached = router
        .call(tools::SEARCH_INCIDENTS, search.clone())
        .await
        .unwrap();
    assert!(!first.cached);
    assert!(cached.cached);
    assert!(router.wrapper().cache_stats().hits >= 1);

    router.wrapper().invalidate_cache().await;
    let refetched = router
        .call(tools::SEARCH_INCIDENTS, search.clone())
        .await
        .unwrap();
    assert!(!refetched.cached);

    router
        .call(
            tools::UPDATE_INCIDENT_STATUS,
            json!({ "id": id, "status": "resolved", "root_cause": "Expired intermediate cert" }),
        )
        .await
        .unwrap();

    let after = router.call(tools::SEARCH_INCIDENTS, search).await.unwrap();
    assert!(!after.cached);
    assert_eq!(complete(after.result)["incidents"][0]["status"], "resolved");
}

#[tokio::test]
async fn test_large_results_are_chunked() {
    let dir = TempDir::new().unwrap();
    let config = AgentConfig {
        chunk_size: 200,
        ..agent_config(dir.path())
    };
    let router = router_with(&config);
    for n in 0..5 {
        create(&router, &format!("Packet loss in zone {}", n)).await;
    }

    let output = router
        .call(tools::LIST_INCIDENTS, json!({ "per_page": 10 }))
        .await
        .unwrap();
    match output.result {
        ToolPayload::Chunked(chunked) => {
            assert!(chunked.total_chunks > 1);
            assert_eq!(
                chunked.chunks.len(),
                chunked.total_chunks.min(agent::chunk::MAX_CHUNKS)
            );
            assert_eq!(chunked.truncated, chunked.total_chunks > agent::chunk::MAX_CHUNKS);
            assert!(chunked
                .chunks
                .iter()
                .all(|c| c.as_str().is_some_and(|s| s.chars().count() <= 200)));
        }
        other => panic!("expected chunked payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_audit_trail_is_redacted_and_records_failures() {
    let dir = TempDir::new().unwrap();
    let router = router_with(&agent_config(dir.path()));

    router
        .call(
            tools::CREATE_INCIDENT,
            json!({
                "title": "Leaked key",
                "category": "security",
                "description": "Key sk-abcdefghijklmnopqrstuvwx pushed by ops@example.com",
                "severity": "critical",
            }),
        )
        .await
        .unwrap();

    let missing = router
        .call(tools::GET_INCIDENT, json!({ "id": "does-not-exist" }))
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let entries = router.audit().unwrap().recent(10).await.unwrap();
    assert_eq!(entries.len(), 2);

    let description = entries[0].args["description"].as_str().unwrap();
    assert!(!description.contains("sk-abcdefghijklmnopqrstuvwx"));
    assert!(!description.contains("ops@example.com"));
    assert!(entries[0].success);

    assert!(!entries[1].success);
    assert!(entries[1].error.is_some());
    assert_eq!(entries[1].route, RouteKind::Wrapper);

    // Raw file is JSON lines
    let raw = std::fs::read_to_string(dir.path().join("agent/audit.jsonl")).unwrap();
    assert_eq!(raw.lines().count(), 2);
    assert!(!raw.contains("ops@example.com"));
}

#[tokio::test]
async fn test_audited_errors_are_redacted_on_both_routes() {
    let dir = TempDir::new().unwrap();
    let mut config = agent_config(dir.path());
    config
        .route_overrides
        .insert(tools::LIST_INCIDENTS.to_string(), RouteKind::Direct);
    let router = router_with(&config);

    // serde echoes the offending value back in its error message
    let wrapped = router
        .call(
            tools::SEARCH_INCIDENTS,
            json!({ "query": "x", "limit": "leak@example.com" }),
        )
        .await;
    assert!(wrapped.is_err());
    let direct = router
        .call(tools::LIST_INCIDENTS, json!({ "page": "oncall@example.com" }))
        .await;
    assert!(direct.is_err());

    let entries = router.audit().unwrap().recent(10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].route, RouteKind::Wrapper);
    assert_eq!(entries[1].route, RouteKind::Direct);
    for entry in &entries {
        let error = entry.error.as_deref().unwrap();
        assert!(error.contains("[EMAIL]"), "{}", error);
    }

    let raw = std::fs::read_to_string(dir.path().join("agent/audit.jsonl")).unwrap();
    assert!(!raw.contains("leak@example.com"));
    assert!(!raw.contains("oncall@example.com"));
}

#[tokio::test]
async fn test_feedback_board_persists() {
    let dir = TempDir::new().unwrap();
    let config = agent_config(dir.path());
    let router = router_with(&config);

    create(&router, "Cron drift").await;
    let _ = router
        .call(tools::GET_INCIDENT, json!({ "id": "nope" }))
        .await;

    // A fresh handle on the same file sees the recorded calls
    let store = FeedbackStore::new(&config.feedback_path);
    let create_stats = store.get(tools::CREATE_INCIDENT).await.unwrap().unwrap();
    assert_eq!(create_stats.calls, 1);
    assert_eq!(create_stats.successes, 1);

    let get_stats = store.get(tools::GET_INCIDENT).await.unwrap().unwrap();
    assert_eq!(get_stats.failures, 1);
    assert_eq!(get_stats.success_rate(), 0.0);

    let rated = store
        .rate(tools::CREATE_INCIDENT, 4, Some("ask admin@example.com"))
        .await
        .unwrap();
    assert_eq!(rated.average_rating, Some(4.0));
    assert!(!rated.notes[0].contains("admin@example.com"));

    assert!(matches!(
        store.rate(tools::CREATE_INCIDENT, 9, None).await,
        Err(AppError::Validation(_))
    ));
    assert!(!dir.path().join("agent/feedback.json.tmp").exists());
}

#[tokio::test]
async fn test_route_overrides_and_metrics() {
    let dir = TempDir::new().unwrap();
    let mut config = agent_config(dir.path());
    config
        .route_overrides
        .insert(tools::GET_INCIDENT.to_string(), RouteKind::Direct);
    let router = router_with(&config);

    let id = create(&router, "Stuck deploy").await;
    let direct = router
        .call(tools::GET_INCIDENT, json!({ "id": id }))
        .await
        .unwrap();
    assert_eq!(direct.route, RouteKind::Direct);
    assert!(!direct.cached);

    let metrics = router.metrics();
    assert_eq!(metrics.route(RouteKind::Wrapper).calls, 1);
    assert_eq!(metrics.route(RouteKind::Direct).calls, 1);
    assert_eq!(metrics.route(RouteKind::Direct).errors, 0);
}

#[test]
fn test_catalog_discovery() {
    let hits = catalog::search_tools("lessons", DetailLevel::Name);
    assert_eq!(hits[0], tools::EXTRACT_LESSONS);

    let all = catalog::search_tools("", DetailLevel::Summary);
    assert_eq!(all.len(), tools::TOOL_NAMES.len());

    let full = catalog::describe(
        catalog::find(tools::ADD_SOLUTION).unwrap(),
        DetailLevel::Full,
    );
    assert!(full["params"].as_array().is_some_and(|p| !p.is_empty()));
}
