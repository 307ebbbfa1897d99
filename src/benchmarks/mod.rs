//! Code Mode token-savings benchmark
//!
//! Compares, per scenario, the context an agent spends when every raw MCP
//! tool schema is loaded up front against progressive discovery: catalog
//! searches at summary detail followed by full descriptors for only the
//! tools the scenario calls. Tokens are estimated at four characters each.
//!
//! ```rust,ignore
//! let results = incident_kb::benchmarks::run_and_save_benchmarks("benchmarks/output")?;
//! ```

pub mod io;
pub mod markdown;
pub mod result;

pub use result::{BenchmarkResult, BenchmarkResultBuilder};

use crate::agent::catalog::{self, DetailLevel};
use crate::mcp::{tools, KnowledgeServer};
use crate::processing::KnowledgeService;
use crate::state::InMemoryStore;
use std::path::Path;
use std::sync::Arc;

/// One agent task: what it searches for and which tools it ends up calling
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub id: &'static str,
    pub description: &'static str,
    pub queries: &'static [&'static str],
    pub tools: &'static [&'static str],
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        id: "triage-lookup",
        description: "Find similar past incidents and read the closest one",
        queries: &["search incidents"],
        tools: &[tools::SEARCH_INCIDENTS, tools::GET_INCIDENT],
    },
    Scenario {
        id: "record-incident",
        description: "Log a new incident",
        queries: &["create incident"],
        tools: &[tools::CREATE_INCIDENT],
    },
    Scenario {
        id: "resolve-and-learn",
        description: "Resolve an incident, attach the fix and extract lessons",
        queries: &["status", "solution", "lessons"],
        tools: &[
            tools::UPDATE_INCIDENT_STATUS,
            tools::ADD_SOLUTION,
            tools::EXTRACT_LESSONS,
        ],
    },
    Scenario {
        id: "knowledge-export",
        description: "Export resolved incidents as markdown",
        queries: &["export"],
        tools: &[tools::EXPORT_KNOWLEDGE],
    },
    Scenario {
        id: "weekly-review",
        description: "Page through open incidents and read two of them",
        queries: &["list incidents"],
        tools: &[tools::LIST_INCIDENTS, tools::GET_INCIDENT],
    },
];

/// Rough token estimate: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Every tool schema the MCP server advertises, serialized as a client receives it
pub fn raw_tool_schemas() -> String {
    let service = Arc::new(KnowledgeService::new(Arc::new(InMemoryStore::new())));
    let definitions = KnowledgeServer::new(service).tool_definitions();
    serde_json::to_string(&definitions).unwrap_or_default()
}

/// Context loaded by progressive discovery; fails on a tool missing from the catalog
fn code_mode_context(scenario: &Scenario) -> Result<String, String> {
    let mut context = String::new();
    for query in scenario.queries {
        let hits = catalog::search_tools(query, DetailLevel::Summary);
        context.push_str(&serde_json::to_string(&hits).unwrap_or_default());
    }
    for name in scenario.tools {
        let tool = catalog::find(name).ok_or_else(|| format!("tool '{}' is not in the catalog", name))?;
        context.push_str(&catalog::describe(tool, DetailLevel::Full).to_string());
    }
    Ok(context)
}

pub fn run_scenario(scenario: &Scenario, raw_schemas: &str) -> BenchmarkResult {
    let builder = BenchmarkResultBuilder::new(scenario.id).description(scenario.description);
    if raw_schemas.is_empty() {
        return builder.error("no tool schemas available").build();
    }

    match code_mode_context(scenario) {
        Ok(context) => builder
            .tokens(estimate_tokens(raw_schemas), estimate_tokens(&context))
            .tools_loaded(scenario.tools)
            .build(),
        Err(message) => builder.error(message).build(),
    }
}

pub fn run_all_benchmarks(raw_schemas: &str) -> Vec<BenchmarkResult> {
    SCENARIOS
        .iter()
        .map(|scenario| {
            let result = run_scenario(scenario, raw_schemas);
            tracing::debug!(
                scenario = scenario.id,
                savings_percent = result.savings_percent(),
                "Benchmark scenario finished"
            );
            result
        })
        .collect()
}

/// Run every scenario and write raw results, the combined JSON and `summary.md`
pub fn run_and_save_benchmarks(output_dir: impl AsRef<Path>) -> std::io::Result<Vec<BenchmarkResult>> {
    let output_dir = output_dir.as_ref();
    let results = run_all_benchmarks(&raw_tool_schemas());

    io::write_results(&results, output_dir)?;
    io::write_combined_results(&results, output_dir)?;
    markdown::write_summary(&results, output_dir)?;

    Ok(results)
}
