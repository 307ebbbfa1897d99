use incident_kb::error::AppError;
use incident_kb::models::{
    generate_record_id, Incident, IncidentCategory, IncidentStatus, NewIncident, Severity,
};
use incident_kb::pocketbase::{collections, Filter, ListParams, ListResult, PocketBaseClient};
use incident_kb::state::{IncidentFilter, KnowledgeStore, PocketBaseStore};
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const RECORDS_PATH: &str = "/api/collections/incidents/records";
const AUTH_PATH: &str = "/api/collections/_superusers/auth-with-password";
const SOLUTIONS_PATH: &str = "/api/collections/solutions/records";
const LESSONS_PATH: &str = "/api/collections/lessons_learned/records";

fn incident_record(id: &str, title: &str, status: &str) -> Value {
    json!({
        "id": id,
        "collectionName": "incidents",
        "title": title,
        "category": "infrastructure",
        "description": "Nodes ran out of disk",
        "severity": "critical",
        "status": status,
        "symptoms": "",
        "context": "",
        "environment": "production",
        "frequency": "",
        "visibility": "",
        "root_cause": "",
        "resolved_at": "",
        "created": "2024-05-01 10:11:12.123Z",
        "updated": "2024-05-01 10:11:12.123Z",
    })
}

fn list_body(items: Vec<Value>) -> String {
    json!({
        "page": 1,
        "perPage": 200,
        "totalItems": items.len(),
        "totalPages": 1,
        "items": items,
    })
    .to_string()
}

fn client(server: &Server) -> PocketBaseClient {
    PocketBaseClient::new(server.url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_list_records_sends_paging_and_filter() {
    let mut server = Server::new_async().await;
    let filter = IncidentFilter {
        statuses: vec![IncidentStatus::Resolved],
        ..Default::default()
    }
    .to_pocketbase()
    .build()
    .unwrap();

    let mock = server
        .mock("GET", RECORDS_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("perPage".into(), "5".into()),
            Matcher::UrlEncoded("filter".into(), filter.clone()),
            Matcher::UrlEncoded("sort".into(), "-created".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "page": 2,
                "perPage": 5,
                "totalItems": 6,
                "totalPages": 2,
                "items": [incident_record("abc123def456ghi", "Disk full", "resolved")],
            })
            .to_string(),
        )
        .create_async()
        .await;

    let result: ListResult<Incident> = client(&server)
        .list_records(
            collections::INCIDENTS,
            &ListParams {
                page: 2,
                per_page: 5,
                filter: Some(filter),
                sort: Some("-created".to_string()),
                expand: None,
            },
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.total_items, 6);
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].status, IncidentStatus::Resolved);
    assert_eq!(result.items[0].severity, Severity::Critical);
    assert!(result.items[0].root_cause.is_none());
}

#[tokio::test]
async fn test_get_record_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{}/missing", RECORDS_PATH).as_str())
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":404,"message":"The requested resource wasn't found.","data":{}}"#)
        .create_async()
        .await;

    let result: Result<Incident, _> = client(&server)
        .get_record(collections::INCIDENTS, "missing")
        .await;

    match result {
        Err(AppError::NotFound(message)) => assert!(message.contains("missing")),
        other => panic!("expected NotFound, got {:?}", other.map(|i| i.id)),
    }
}

#[tokio::test]
async fn test_error_status_mapping() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", RECORDS_PATH)
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"code":400,"message":"Failed to create record.","data":{"title":{"code":"validation_required"}}}"#,
        )
        .create_async()
        .await;
    server
        .mock("DELETE", format!("{}/locked", RECORDS_PATH).as_str())
        .with_status(403)
        .with_body(r#"{"code":403,"message":"Only superusers can perform this action.","data":{}}"#)
        .create_async()
        .await;
    server
        .mock("DELETE", format!("{}/boom", RECORDS_PATH).as_str())
        .with_status(500)
        .with_body("internal")
        .create_async()
        .await;

    let pb = client(&server);

    let created: Result<Value, _> = pb
        .create_record(collections::INCIDENTS, &json!({ "title": "" }))
        .await;
    match created {
        Err(AppError::Validation(message)) => assert!(message.contains("validation_required")),
        other => panic!("expected Validation, got {:?}", other),
    }

    assert!(matches!(
        pb.delete_record(collections::INCIDENTS, "locked").await,
        Err(AppError::Authorization(_))
    ));
    assert!(matches!(
        pb.delete_record(collections::INCIDENTS, "boom").await,
        Err(AppError::Upstream { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_authenticates_and_retries_on_401() {
    let mut server = Server::new_async().await;

    let auth = server
        .mock("POST", AUTH_PATH)
        .match_body(Matcher::PartialJson(json!({
            "identity": "admin@example.com",
            "password": "secret",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"tok-123","record":{}}"#)
        .expect(2)
        .create_async()
        .await;

    let rejected = server
        .mock("GET", format!("{}/abc", RECORDS_PATH).as_str())
        .match_header("authorization", "tok-123")
        .with_status(401)
        .with_body(r#"{"code":401,"message":"The request requires valid record authorization token.","data":{}}"#)
        .expect(1)
        .create_async()
        .await;

    let accepted = server
        .mock("GET", format!("{}/abc", RECORDS_PATH).as_str())
        .match_header("authorization", "tok-123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(incident_record("abc", "Expired session", "open").to_string())
        .expect(1)
        .create_async()
        .await;

    let pb = client(&server).with_credentials("admin@example.com", "secret");
    let incident: Incident = pb.get_record(collections::INCIDENTS, "abc").await.unwrap();

    assert_eq!(incident.title, "Expired session");
    auth.assert_async().await;
    rejected.assert_async().await;
    accepted.assert_async().await;
}

#[tokio::test]
async fn test_failed_login_is_authentication_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", AUTH_PATH)
        .with_status(400)
        .with_body(r#"{"code":400,"message":"Failed to authenticate.","data":{}}"#)
        .create_async()
        .await;

    let pb = client(&server).with_credentials("admin@example.com", "wrong");
    assert!(matches!(
        pb.authenticate().await,
        Err(AppError::Authentication(_))
    ));
}

#[tokio::test]
async fn test_health() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/health")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":200,"message":"API is healthy.","data":{}}"#)
        .create_async()
        .await;

    let status = client(&server).health().await.unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.message, "API is healthy.");
}

#[tokio::test]
async fn test_store_maps_missing_record_to_none() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", format!("{}/gone", RECORDS_PATH).as_str())
        .with_status(404)
        .with_body(r#"{"code":404,"message":"Not found.","data":{}}"#)
        .create_async()
        .await;

    let store = PocketBaseStore::new(Arc::new(client(&server)));
    assert!(store.get_incident("gone").await.unwrap().is_none());
    assert_eq!(store.backend_name(), "pocketbase");
}

#[tokio::test]
async fn test_store_create_sends_only_writable_fields() {
    let mut server = Server::new_async().await;
    let incident = Incident::from_new(
        generate_record_id(),
        NewIncident {
            title: "Disk full".to_string(),
            category: IncidentCategory::Infrastructure,
            description: "Nodes ran out of disk".to_string(),
            severity: Severity::Critical,
            status: None,
            symptoms: None,
            context: None,
            environment: Some("production".to_string()),
            frequency: None,
            visibility: None,
            root_cause: None,
        },
    );

    let mock = server
        .mock("POST", RECORDS_PATH)
        .match_body(Matcher::PartialJson(json!({
            "id": incident.id,
            "title": "Disk full",
            "status": "open",
            "environment": "production",
        })))
        .match_request(|request| {
            let body: Value = match request
                .utf8_lossy_body()
                .ok()
                .and_then(|body| serde_json::from_str(&body).ok())
            {
                Some(body) => body,
                None => return false,
            };
            let fields = match body.as_object() {
                Some(fields) => fields,
                None => return false,
            };
            !fields.contains_key("created")
                && !fields.contains_key("updated")
                && !fields.contains_key("symptoms")
                && fields.values().all(|v| !v.is_null())
        })
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(incident_record(&incident.id, "Disk full", "open").to_string())
        .expect(1)
        .create_async()
        .await;

    let store = PocketBaseStore::new(Arc::new(client(&server)));
    let created = store.create_incident(&incident).await.unwrap();

    mock.assert_async().await;
    assert_eq!(created.id, incident.id);
    assert_eq!(created.environment.as_deref(), Some("production"));
}

#[tokio::test]
async fn test_store_list_maps_paging() {
    let mut server = Server::new_async().await;
    let filter = IncidentFilter {
        query: Some("disk".to_string()),
        statuses: vec![IncidentStatus::Open],
        ..Default::default()
    };
    let expected_filter = filter.to_pocketbase().build().unwrap();
    assert!(expected_filter.contains("status = 'open'"));

    let mock = server
        .mock("GET", RECORDS_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("perPage".into(), "20".into()),
            Matcher::UrlEncoded("filter".into(), expected_filter),
            Matcher::UrlEncoded("sort".into(), filter.sort.as_pocketbase().into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "page": 2,
                "perPage": 20,
                "totalItems": 41,
                "totalPages": 3,
                "items": [incident_record("abc123def456ghi", "Disk full", "open")],
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let store = PocketBaseStore::new(Arc::new(client(&server)));
    let page = store.list_incidents(&filter, 2, 20).await.unwrap();

    mock.assert_async().await;
    assert_eq!(page.page, 2);
    assert_eq!(page.per_page, 20);
    assert_eq!(page.total_items, 41);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items[0].title, "Disk full");
}

#[tokio::test]
async fn test_store_delete_cascades_to_children() {
    let mut server = Server::new_async().await;
    let id = "inc000000000001";
    let by_incident = Filter::new().eq("incident_id", id).build().unwrap();

    let lookup = server
        .mock("GET", format!("{}/{}", RECORDS_PATH, id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(incident_record(id, "Disk full", "resolved").to_string())
        .expect(1)
        .create_async()
        .await;

    let mut mocks = vec![lookup];
    for (path, child) in [
        (SOLUTIONS_PATH, "sol000000000001"),
        (LESSONS_PATH, "les000000000001"),
    ] {
        mocks.push(
            server
                .mock("GET", path)
                .match_query(Matcher::UrlEncoded("filter".into(), by_incident.clone()))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(list_body(vec![json!({ "id": child, "incident_id": id })]))
                .expect(1)
                .create_async()
                .await,
        );
        mocks.push(
            server
                .mock("DELETE", format!("{}/{}", path, child).as_str())
                .with_status(204)
                .expect(1)
                .create_async()
                .await,
        );
    }
    mocks.push(
        server
            .mock("DELETE", format!("{}/{}", RECORDS_PATH, id).as_str())
            .with_status(204)
            .expect(1)
            .create_async()
            .await,
    );

    let store = PocketBaseStore::new(Arc::new(client(&server)));
    store.delete_incident(id).await.unwrap();

    for mock in &mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_store_refuses_ids_that_escape_the_collection() {
    let mut server = Server::new_async().await;
    let lesson = server
        .mock("GET", format!("{}/abc", LESSONS_PATH).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"abc","title":"a lesson"}"#)
        .expect(0)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", format!("{}/abc", LESSONS_PATH).as_str())
        .with_status(204)
        .expect(0)
        .create_async()
        .await;

    let store = PocketBaseStore::new(Arc::new(client(&server)));
    let id = "../../lessons_learned/records/abc";
    assert!(matches!(
        store.get_solution(id).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        store.delete_solution(id).await,
        Err(AppError::Validation(_))
    ));

    lesson.assert_async().await;
    delete.assert_async().await;
}
