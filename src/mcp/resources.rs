//! Read-only MCP resources

use crate::error::AppError;
use crate::processing::KnowledgeService;
use crate::state::IncidentFilter;
use rmcp::{
    model::{AnnotateAble, RawResource, ReadResourceResult, Resource, ResourceContents},
    ErrorData as McpError,
};
use serde_json::json;

pub const RECENT_INCIDENTS_URI: &str = "kb://incidents/recent";
pub const STATS_URI: &str = "kb://stats";
pub const INCIDENT_URI_TEMPLATE: &str = "kb://incidents/{id}";

const INCIDENT_URI_PREFIX: &str = "kb://incidents/";
const RECENT_LIMIT: u32 = 20;

/// Which resource a URI names
#[derive(Debug, PartialEq, Eq)]
pub enum ResourceKind<'a> {
    RecentIncidents,
    Stats,
    Incident(&'a str),
}

pub fn parse_uri(uri: &str) -> Option<ResourceKind<'_>> {
    match uri {
        RECENT_INCIDENTS_URI => Some(ResourceKind::RecentIncidents),
        STATS_URI => Some(ResourceKind::Stats),
        _ => uri
            .strip_prefix(INCIDENT_URI_PREFIX)
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .map(ResourceKind::Incident),
    }
}

pub fn resource_list() -> Vec<Resource> {
    vec![
        json_resource(
            RECENT_INCIDENTS_URI,
            "recent-incidents",
            "The 20 most recently created incidents",
        ),
        json_resource(STATS_URI, "stats", "Incident totals by status, severity and category"),
    ]
}

fn json_resource(uri: &str, name: &str, description: &str) -> Resource {
    let mut raw = RawResource::new(uri, name);
    raw.description = Some(description.to_string());
    raw.mime_type = Some("application/json".to_string());
    raw.no_annotation()
}

/// Resolve a resource URI to its JSON contents
pub async fn read(service: &KnowledgeService, uri: &str) -> Result<ReadResourceResult, McpError> {
    let value = match parse_uri(uri) {
        Some(ResourceKind::RecentIncidents) => {
            let page = service
                .list_incidents(&IncidentFilter::default(), 1, RECENT_LIMIT)
                .await
                .map_err(to_mcp_error)?;
            json!({ "total": page.total_items, "incidents": page.items })
        }
        Some(ResourceKind::Stats) => {
            serde_json::to_value(service.stats().await.map_err(to_mcp_error)?)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?
        }
        Some(ResourceKind::Incident(id)) => serde_json::to_value(
            service
                .get_incident_details(id)
                .await
                .map_err(to_mcp_error)?,
        )
        .map_err(|e| McpError::internal_error(e.to_string(), None))?,
        None => {
            return Err(McpError::resource_not_found(
                format!("Unknown resource: {}", uri),
                Some(json!({ "uri": uri })),
            ))
        }
    };

    let text = serde_json::to_string_pretty(&value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

    Ok(ReadResourceResult {
        contents: vec![ResourceContents::text(text, uri)],
    })
}

fn to_mcp_error(error: AppError) -> McpError {
    match error {
        AppError::NotFound(message) => McpError::resource_not_found(message, None),
        AppError::Validation(message) => McpError::invalid_params(message, None),
        other => McpError::internal_error(other.to_string(), None),
    }
}
