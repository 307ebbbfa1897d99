//! Tool dispatch table shared by the MCP server and the agent helper layer
//!
//! Every tool takes a JSON object and returns a JSON value. [`dispatch`] is
//! the single entry point; the typed argument structs double as the MCP
//! input schemas.

use crate::error::{AppError, Result};
use crate::export::{ExportFormat, ExportRequest};
use crate::metrics::{TOOL_CALLS_TOTAL, TOOL_CALL_DURATION_SECONDS};
use crate::models::{
    IncidentCategory, IncidentStatus, LessonDraft, NewIncident, NewSolution, Severity,
};
use crate::processing::KnowledgeService;
use crate::state::{IncidentFilter, IncidentSort};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

pub const CREATE_INCIDENT: &str = "create_incident";
pub const SEARCH_INCIDENTS: &str = "search_incidents";
pub const GET_INCIDENT: &str = "get_incident";
pub const UPDATE_INCIDENT_STATUS: &str = "update_incident_status";
pub const ADD_SOLUTION: &str = "add_solution";
pub const EXTRACT_LESSONS: &str = "extract_lessons";
pub const EXPORT_KNOWLEDGE: &str = "export_knowledge";
pub const LIST_INCIDENTS: &str = "list_incidents";

/// Every tool name, in catalog order
pub const TOOL_NAMES: [&str; 8] = [
    CREATE_INCIDENT,
    SEARCH_INCIDENTS,
    GET_INCIDENT,
    UPDATE_INCIDENT_STATUS,
    ADD_SOLUTION,
    EXTRACT_LESSONS,
    EXPORT_KNOWLEDGE,
    LIST_INCIDENTS,
];

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchIncidentsArgs {
    /// Text to look for in titles and descriptions (case-insensitive)
    pub query: String,
    /// Maximum number of results (default 20, max 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetIncidentArgs {
    /// Incident id
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateIncidentStatusArgs {
    /// Incident id
    pub id: String,
    /// New status
    pub status: IncidentStatus,
    /// Root cause, recorded alongside the status change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractLessonsArgs {
    /// Incident to learn from
    pub incident_id: String,
    /// Explicit lesson; derived from the incident and its solutions when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson: Option<LessonDraft>,
}

/// Filters shared by listing and export
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FilterArgs {
    /// Text filter over title and description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<IncidentStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severities: Vec<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<IncidentCategory>,
}

impl FilterArgs {
    fn into_filter(self) -> IncidentFilter {
        IncidentFilter {
            query: self.query.filter(|q| !q.trim().is_empty()),
            statuses: self.statuses,
            severities: self.severities,
            categories: self.categories,
            sort: IncidentSort::Newest,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExportKnowledgeArgs {
    /// json, csv or markdown (default json)
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(flatten)]
    pub filter: FilterArgs,
    /// Maximum number of incidents to export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListIncidentsArgs {
    /// 1-based page number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size (default 20, max 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(flatten)]
    pub filter: FilterArgs,
}

/// Metric label for a tool name; unknown names collapse to "unknown"
pub fn metric_label(name: &str) -> &'static str {
    TOOL_NAMES
        .iter()
        .find(|t| **t == name)
        .copied()
        .unwrap_or("unknown")
}

/// Run one tool by name
pub async fn dispatch(service: &KnowledgeService, name: &str, args: Value) -> Result<Value> {
    let start = Instant::now();
    let result = run(service, name, args).await;

    let status = if result.is_ok() { "success" } else { "error" };
    let label = metric_label(name);
    TOOL_CALLS_TOTAL.with_label_values(&[label, status]).inc();
    TOOL_CALL_DURATION_SECONDS
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());

    if let Err(ref e) = result {
        crate::metrics::record_error("mcp", e);
        tracing::debug!(tool = %name, error = %e, "Tool call failed");
    }
    result
}

async fn run(service: &KnowledgeService, name: &str, args: Value) -> Result<Value> {
    match name {
        CREATE_INCIDENT => {
            let new: NewIncident = parse_args(name, args)?;
            let incident = service.create_incident(new).await?;
            Ok(serde_json::to_value(incident)?)
        }
        SEARCH_INCIDENTS => {
            let args: SearchIncidentsArgs = parse_args(name, args)?;
            let incidents = service.search_incidents(&args.query, args.limit).await?;
            Ok(json!({
                "query": args.query,
                "total": incidents.len(),
                "incidents": incidents,
            }))
        }
        GET_INCIDENT => {
            let args: GetIncidentArgs = parse_args(name, args)?;
            let entry = service.get_incident_details(&args.id).await?;
            Ok(serde_json::to_value(entry)?)
        }
        UPDATE_INCIDENT_STATUS => {
            let args: UpdateIncidentStatusArgs = parse_args(name, args)?;
            let mut patch = crate::models::IncidentPatch::status(args.status);
            patch.root_cause = args.root_cause;
            let incident = service.update_incident(&args.id, patch).await?;
            Ok(serde_json::to_value(incident)?)
        }
        ADD_SOLUTION => {
            let new: NewSolution = parse_args(name, args)?;
            let solution = service.add_solution(new).await?;
            Ok(serde_json::to_value(solution)?)
        }
        EXTRACT_LESSONS => {
            let args: ExtractLessonsArgs = parse_args(name, args)?;
            let lessons = service
                .extract_lessons(&args.incident_id, args.lesson)
                .await?;
            Ok(json!({
                "incident_id": args.incident_id,
                "lessons": lessons,
            }))
        }
        EXPORT_KNOWLEDGE => {
            let args: ExportKnowledgeArgs = parse_args(name, args)?;
            let rendered = service
                .export_knowledge(ExportRequest {
                    format: args.format,
                    filter: args.filter.into_filter(),
                    limit: args.limit,
                })
                .await?;
            Ok(json!({
                "format": rendered.format,
                "file_name": rendered.file_name,
                "total_incidents": rendered.total_incidents,
                "content": rendered.body,
            }))
        }
        LIST_INCIDENTS => {
            let args: ListIncidentsArgs = parse_args(name, args)?;
            let page = service
                .list_incidents(
                    &args.filter.into_filter(),
                    args.page.unwrap_or(1),
                    args.per_page.unwrap_or(20),
                )
                .await?;
            Ok(serde_json::to_value(page)?)
        }
        other => Err(AppError::Tool {
            tool: other.to_string(),
            message: format!("Unknown tool. Available: {}", TOOL_NAMES.join(", ")),
        }),
    }
}

/// Deserialize tool arguments; a missing/null payload counts as `{}`
fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| AppError::Tool {
        tool: tool.to_string(),
        message: format!("Invalid arguments: {}", e),
    })
}
