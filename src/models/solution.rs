use super::serde_helpers::{opt_text, timestamp};
use super::RecordId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A solution attached to an incident (`solutions` collection)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    pub id: RecordId,

    /// Owning incident
    pub incident_id: RecordId,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// JSON-encoded array of step strings
    #[serde(default)]
    pub steps: String,

    #[serde(default, with = "opt_text")]
    pub resources_needed: Option<String>,

    #[serde(default, with = "opt_text")]
    pub time_estimate: Option<String>,

    #[serde(default, with = "opt_text")]
    pub warnings: Option<String>,

    /// 1..=5, 0 when unrated
    #[serde(default)]
    pub effectiveness: u8,

    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,

    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

impl Solution {
    pub fn from_new(id: RecordId, new: NewSolution) -> Self {
        let now = Utc::now();
        Self {
            id,
            incident_id: new.incident_id,
            title: new.title,
            description: new.description,
            steps: new.steps.map(|s| s.encode()).unwrap_or_else(|| "[]".to_string()),
            resources_needed: new.resources_needed,
            time_estimate: new.time_estimate,
            warnings: new.warnings,
            effectiveness: new.effectiveness.unwrap_or(0),
            created: now,
            updated: now,
        }
    }

    /// Decoded steps; tolerates legacy plain-text values
    pub fn steps_list(&self) -> Vec<String> {
        decode_steps(&self.steps)
    }

    pub fn apply_patch(&mut self, patch: SolutionPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(steps) = patch.steps {
            self.steps = steps.encode();
        }
        if let Some(resources) = patch.resources_needed {
            self.resources_needed = Some(resources);
        }
        if let Some(time_estimate) = patch.time_estimate {
            self.time_estimate = Some(time_estimate);
        }
        if let Some(warnings) = patch.warnings {
            self.warnings = Some(warnings);
        }
        if let Some(effectiveness) = patch.effectiveness {
            self.effectiveness = effectiveness;
        }
        self.updated = Utc::now();
    }
}

/// Steps as accepted from clients: free text or a list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum StepsInput {
    List(Vec<String>),
    Text(String),
}

impl StepsInput {
    /// Normalize to the persisted JSON-encoded array form
    pub fn encode(&self) -> String {
        let steps = match self {
            StepsInput::List(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            StepsInput::Text(text) => decode_steps(text),
        };
        serde_json::to_string(&steps).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Decode a steps value: a JSON array string, or newline-separated text
pub fn decode_steps(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items;
        }
    }

    trimmed
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip `-`, `*`, `•` or `1.`/`1)` prefixes from a line
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        return rest.trim();
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }

    line
}

/// Input for adding a solution to an incident
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct NewSolution {
    /// Incident the solution belongs to
    #[validate(length(min = 1))]
    pub incident_id: RecordId,

    /// Short title of the fix
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// What the fix does
    #[serde(default)]
    pub description: String,

    /// Steps, as a list or newline-separated text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<StepsInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_needed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_estimate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,

    /// Effectiveness rating from 1 to 5
    #[validate(range(min = 1, max = 5))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<u8>,
}

/// Partial update of a solution
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, JsonSchema)]
pub struct SolutionPatch {
    #[validate(length(min = 1, max = 200))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<StepsInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_needed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_estimate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,

    #[validate(range(min = 1, max = 5))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_from_list() {
        let input = StepsInput::List(vec![
            "Restart pod".to_string(),
            "  ".to_string(),
            "Check logs".to_string(),
        ]);
        assert_eq!(input.encode(), r#"["Restart pod","Check logs"]"#);
    }

    #[test]
    fn test_steps_from_numbered_text() {
        let input = StepsInput::Text("1. Drain node\n2) Patch kernel\n- Reboot\n\n".to_string());
        assert_eq!(
            decode_steps(&input.encode()),
            vec!["Drain node", "Patch kernel", "Reboot"]
        );
    }

    #[test]
    fn test_steps_text_containing_json_array() {
        let input = StepsInput::Text(r#"["a","b"]"#.to_string());
        assert_eq!(input.encode(), r#"["a","b"]"#);
    }

    #[test]
    fn test_untagged_steps_deserialize() {
        let list: StepsInput = serde_json::from_str(r#"["x","y"]"#).unwrap();
        assert_eq!(list, StepsInput::List(vec!["x".to_string(), "y".to_string()]));

        let text: StepsInput = serde_json::from_str(r#""just do it""#).unwrap();
        assert_eq!(text, StepsInput::Text("just do it".to_string()));
    }

    #[test]
    fn test_legacy_plain_text_steps_decode() {
        let solution = Solution {
            id: "s1".to_string(),
            incident_id: "i1".to_string(),
            title: "Fix".to_string(),
            description: String::new(),
            steps: "flush cache\nrestart".to_string(),
            resources_needed: None,
            time_estimate: None,
            warnings: None,
            effectiveness: 0,
            created: Utc::now(),
            updated: Utc::now(),
        };
        assert_eq!(solution.steps_list(), vec!["flush cache", "restart"]);
    }

    #[test]
    fn test_effectiveness_range_validation() {
        let mut new = NewSolution {
            incident_id: "i1".to_string(),
            title: "Fix".to_string(),
            description: String::new(),
            steps: None,
            resources_needed: None,
            time_estimate: None,
            warnings: None,
            effectiveness: Some(9),
        };
        assert!(new.validate().is_err());
        new.effectiveness = Some(4);
        assert!(new.validate().is_ok());
    }
}
