//! MCP server over stdio
//!
//! Exposes the knowledge-base tools and a few read-only resources to MCP
//! clients. Tool bodies live in [`tools`], which the agent layer shares.

pub mod resources;
pub mod tools;

use crate::models::{NewIncident, NewSolution};
use crate::processing::KnowledgeService;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        Implementation, ListResourcesResult, PaginatedRequestParam, ReadResourceRequestParam,
        ReadResourceResult, ServerCapabilities, ServerInfo, Tool,
    },
    service::{RequestContext, RoleServer},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use std::sync::Arc;
use tools::{
    ExportKnowledgeArgs, ExtractLessonsArgs, GetIncidentArgs, ListIncidentsArgs,
    SearchIncidentsArgs, UpdateIncidentStatusArgs,
};

/// MCP server state
#[derive(Clone)]
pub struct KnowledgeServer {
    service: Arc<KnowledgeService>,
    tool_router: ToolRouter<Self>,
}

impl KnowledgeServer {
    pub fn new(service: Arc<KnowledgeService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    /// Tool definitions as advertised to MCP clients
    pub fn tool_definitions(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    /// Route a typed request through the shared dispatch table
    async fn call<T: Serialize>(&self, tool: &str, args: T) -> Result<String, String> {
        let args = serde_json::to_value(args).map_err(|e| e.to_string())?;
        let value = tools::dispatch(&self.service, tool, args)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&value).map_err(|e| e.to_string())
    }
}

#[tool_router]
impl KnowledgeServer {
    #[tool(description = "Create an incident. Requires title, category, description and severity.")]
    async fn create_incident(
        &self,
        Parameters(req): Parameters<NewIncident>,
    ) -> Result<String, String> {
        self.call(tools::CREATE_INCIDENT, req).await
    }

    #[tool(description = "Search incidents by case-insensitive text over title and description.")]
    async fn search_incidents(
        &self,
        Parameters(req): Parameters<SearchIncidentsArgs>,
    ) -> Result<String, String> {
        self.call(tools::SEARCH_INCIDENTS, req).await
    }

    #[tool(description = "Get one incident with its solutions and lessons.")]
    async fn get_incident(
        &self,
        Parameters(req): Parameters<GetIncidentArgs>,
    ) -> Result<String, String> {
        self.call(tools::GET_INCIDENT, req).await
    }

    #[tool(description = "Change an incident's status (open, investigating, resolved, archived).")]
    async fn update_incident_status(
        &self,
        Parameters(req): Parameters<UpdateIncidentStatusArgs>,
    ) -> Result<String, String> {
        self.call(tools::UPDATE_INCIDENT_STATUS, req).await
    }

    #[tool(description = "Add a solution to an existing incident. Steps may be a list or newline-separated text.")]
    async fn add_solution(
        &self,
        Parameters(req): Parameters<NewSolution>,
    ) -> Result<String, String> {
        self.call(tools::ADD_SOLUTION, req).await
    }

    #[tool(description = "Record lessons learned for an incident, explicit or derived from its solutions.")]
    async fn extract_lessons(
        &self,
        Parameters(req): Parameters<ExtractLessonsArgs>,
    ) -> Result<String, String> {
        self.call(tools::EXTRACT_LESSONS, req).await
    }

    #[tool(description = "Export incidents with solutions and lessons as json, csv or markdown.")]
    async fn export_knowledge(
        &self,
        Parameters(req): Parameters<ExportKnowledgeArgs>,
    ) -> Result<String, String> {
        self.call(tools::EXPORT_KNOWLEDGE, req).await
    }

    #[tool(description = "List incidents page by page, filtered by status, severity, category or text.")]
    async fn list_incidents(
        &self,
        Parameters(req): Parameters<ListIncidentsArgs>,
    ) -> Result<String, String> {
        self.call(tools::LIST_INCIDENTS, req).await
    }
}

#[tool_handler]
impl ServerHandler for KnowledgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "incident-kb".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(format!(
                "Incident knowledge base. Record incidents, attach solutions, extract lessons \
                 and export what was learned. Resources: {}, {} and {}.",
                resources::RECENT_INCIDENTS_URI,
                resources::STATS_URI,
                resources::INCIDENT_URI_TEMPLATE
            )),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(resources::resource_list()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        resources::read(&self.service, &request.uri).await
    }
}

/// Serve MCP over stdin/stdout until the client disconnects
pub async fn serve_stdio(service: Arc<KnowledgeService>) -> anyhow::Result<()> {
    tracing::info!("Starting MCP server on stdio");
    let running = KnowledgeServer::new(service)
        .serve(rmcp::transport::stdio())
        .await?;
    running.waiting().await?;
    tracing::info!("MCP client disconnected");
    Ok(())
}
