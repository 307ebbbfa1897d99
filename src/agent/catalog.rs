//! Static tool catalog for progressive discovery
//!
//! Agents search this catalog instead of loading every tool schema up
//! front, then ask for `full` detail only on the tools they intend to call.

use crate::mcp::tools;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    /// Safe to cache; has no side effects on the knowledge base
    pub read_only: bool,
    pub params: &'static [ParamSpec],
}

/// How much of each descriptor a search returns
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DetailLevel {
    Name,
    #[default]
    Summary,
    Full,
}

const fn param(
    name: &'static str,
    kind: &'static str,
    required: bool,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required,
        description,
    }
}

const FILTER_PARAMS_NOTE: &str = "statuses, severities and categories accept lists of enum values";

static CATALOG: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: tools::CREATE_INCIDENT,
        category: "incidents",
        description: "Create an incident with title, category, description and severity",
        read_only: false,
        params: &[
            param("title", "string", true, "Short summary"),
            param("category", "string", true, "Incident category"),
            param("description", "string", true, "What happened"),
            param("severity", "string", true, "low, medium, high or critical"),
            param("symptoms", "string", false, "Observed symptoms"),
            param("root_cause", "string", false, "Known root cause"),
            param("environment", "string", false, "Affected environment"),
        ],
    },
    ToolDescriptor {
        name: tools::SEARCH_INCIDENTS,
        category: "search",
        description: "Search incidents by case-insensitive text over title and description",
        read_only: true,
        params: &[
            param("query", "string", true, "Text to look for"),
            param("limit", "integer", false, "Maximum results, default 20"),
        ],
    },
    ToolDescriptor {
        name: tools::GET_INCIDENT,
        category: "incidents",
        description: "Get one incident together with its solutions and lessons",
        read_only: true,
        params: &[param("id", "string", true, "Incident id")],
    },
    ToolDescriptor {
        name: tools::UPDATE_INCIDENT_STATUS,
        category: "incidents",
        description: "Change an incident status and optionally record its root cause",
        read_only: false,
        params: &[
            param("id", "string", true, "Incident id"),
            param("status", "string", true, "open, investigating, resolved or archived"),
            param("root_cause", "string", false, "Root cause"),
        ],
    },
    ToolDescriptor {
        name: tools::ADD_SOLUTION,
        category: "solutions",
        description: "Attach a solution with ordered steps to an existing incident",
        read_only: false,
        params: &[
            param("incident_id", "string", true, "Incident id"),
            param("title", "string", true, "Solution title"),
            param("description", "string", false, "Details"),
            param("steps", "array|string", false, "Steps as a list or newline-separated text"),
            param("effectiveness", "integer", false, "Rating from 1 to 5"),
        ],
    },
    ToolDescriptor {
        name: tools::EXTRACT_LESSONS,
        category: "lessons",
        description: "Record lessons learned for an incident, explicit or derived from its solutions",
        read_only: false,
        params: &[
            param("incident_id", "string", true, "Incident id"),
            param("lesson", "object", false, "Explicit lesson; derived when omitted"),
        ],
    },
    ToolDescriptor {
        name: tools::EXPORT_KNOWLEDGE,
        category: "knowledge",
        description: "Export incidents with solutions and lessons as json, csv or markdown",
        read_only: true,
        params: &[
            param("format", "string", false, "json, csv or markdown"),
            param("query", "string", false, "Text filter"),
            param("statuses", "array", false, FILTER_PARAMS_NOTE),
            param("limit", "integer", false, "Maximum incidents"),
        ],
    },
    ToolDescriptor {
        name: tools::LIST_INCIDENTS,
        category: "search",
        description: "List incidents page by page with status, severity and category filters",
        read_only: true,
        params: &[
            param("page", "integer", false, "1-based page"),
            param("per_page", "integer", false, "Page size, max 100"),
            param("query", "string", false, "Text filter"),
            param("statuses", "array", false, FILTER_PARAMS_NOTE),
        ],
    },
];

pub fn catalog() -> &'static [ToolDescriptor] {
    CATALOG
}

pub fn find(name: &str) -> Option<&'static ToolDescriptor> {
    CATALOG.iter().find(|t| t.name == name)
}

/// Unknown tools are never treated as cacheable
pub fn is_read_only(name: &str) -> bool {
    find(name).is_some_and(|t| t.read_only)
}

/// Keyword search over the catalog; an empty query lists everything
pub fn search_tools(query: &str, level: DetailLevel) -> Vec<Value> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut scored: Vec<(u32, &ToolDescriptor)> = CATALOG
        .iter()
        .map(|tool| (score(tool, &terms), tool))
        .filter(|(score, _)| terms.is_empty() || *score > 0)
        .collect();
    // Stable: ties keep catalog order
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .map(|(_, tool)| describe(tool, level))
        .collect()
}

fn score(tool: &ToolDescriptor, terms: &[String]) -> u32 {
    let description = tool.description.to_lowercase();
    terms
        .iter()
        .map(|term| {
            let mut points = 0;
            if tool.name.contains(term.as_str()) {
                points += 3;
            }
            if tool.category.contains(term.as_str()) {
                points += 2;
            }
            if description.contains(term.as_str()) {
                points += 1;
            }
            points
        })
        .sum()
}

pub fn describe(tool: &ToolDescriptor, level: DetailLevel) -> Value {
    match level {
        DetailLevel::Name => json!(tool.name),
        DetailLevel::Summary => json!({
            "name": tool.name,
            "category": tool.category,
            "description": tool.description,
        }),
        DetailLevel::Full => json!(tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_every_tool() {
        for name in tools::TOOL_NAMES {
            assert!(find(name).is_some(), "{} missing from catalog", name);
        }
        assert_eq!(catalog().len(), tools::TOOL_NAMES.len());
    }

    #[test]
    fn test_read_only_flags() {
        assert!(is_read_only(tools::SEARCH_INCIDENTS));
        assert!(is_read_only(tools::GET_INCIDENT));
        assert!(!is_read_only(tools::CREATE_INCIDENT));
        assert!(!is_read_only("drop_tables"));
    }

    #[test]
    fn test_search_ranks_name_matches_first() {
        let results = search_tools("solution", DetailLevel::Name);
        assert_eq!(results[0], json!("add_solution"));
    }

    #[test]
    fn test_empty_query_lists_everything() {
        let results = search_tools("  ", DetailLevel::Summary);
        assert_eq!(results.len(), catalog().len());
        assert_eq!(results[0]["name"], "create_incident");
        assert!(results[0].get("params").is_none());
    }

    #[test]
    fn test_full_detail_includes_params() {
        let results = search_tools("export", DetailLevel::Full);
        assert_eq!(results[0]["name"], "export_knowledge");
        assert_eq!(results[0]["read_only"], true);
        assert!(results[0]["params"].as_array().unwrap().len() >= 2);
    }

    #[test]
    fn test_no_match() {
        assert!(search_tools("kubernetes", DetailLevel::Name).is_empty());
    }

    #[test]
    fn test_detail_level_parsing() {
        assert_eq!("FULL".parse::<DetailLevel>().unwrap(), DetailLevel::Full);
        assert_eq!(DetailLevel::default(), DetailLevel::Summary);
    }
}
