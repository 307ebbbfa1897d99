use super::serde_helpers::{opt_text, opt_timestamp, text_or_default, timestamp};
use super::RecordId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use validator::Validate;

/// An incident record as stored in the `incidents` collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    /// Record identifier
    pub id: RecordId,

    /// Short human-readable title
    pub title: String,

    pub category: IncidentCategory,

    /// Detailed description
    pub description: String,

    pub severity: Severity,

    /// Lifecycle status
    #[serde(default, with = "text_or_default")]
    pub status: IncidentStatus,

    /// Observable symptoms
    #[serde(default, with = "opt_text")]
    pub symptoms: Option<String>,

    /// What was going on when it happened
    #[serde(default, with = "opt_text")]
    pub context: Option<String>,

    /// Affected environment (prod, staging, laptop, ...)
    #[serde(default, with = "opt_text")]
    pub environment: Option<String>,

    #[serde(default, with = "opt_text")]
    pub frequency: Option<Frequency>,

    #[serde(default, with = "text_or_default")]
    pub visibility: Visibility,

    #[serde(default, with = "opt_text")]
    pub root_cause: Option<String>,

    /// Set the first time the status becomes `resolved`
    #[serde(default, with = "opt_timestamp")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,

    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

impl Incident {
    /// Materialize a new incident from validated input
    pub fn from_new(id: RecordId, new: NewIncident) -> Self {
        let now = Utc::now();
        let status = new.status.unwrap_or_default();

        Self {
            id,
            title: new.title,
            category: new.category,
            description: new.description,
            severity: new.severity,
            resolved_at: (status == IncidentStatus::Resolved).then_some(now),
            status,
            symptoms: new.symptoms,
            context: new.context,
            environment: new.environment,
            frequency: new.frequency,
            visibility: new.visibility.unwrap_or_default(),
            root_cause: new.root_cause,
            created: now,
            updated: now,
        }
    }

    /// Case-insensitive substring match over title and description
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }

    /// Apply a partial update, returning the previous status if it changed
    pub fn apply_patch(&mut self, patch: IncidentPatch) -> Option<IncidentStatus> {
        let previous = self.status;

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(severity) = patch.severity {
            self.severity = severity;
        }
        if let Some(symptoms) = patch.symptoms {
            self.symptoms = Some(symptoms);
        }
        if let Some(context) = patch.context {
            self.context = Some(context);
        }
        if let Some(environment) = patch.environment {
            self.environment = Some(environment);
        }
        if let Some(frequency) = patch.frequency {
            self.frequency = Some(frequency);
        }
        if let Some(visibility) = patch.visibility {
            self.visibility = visibility;
        }
        if let Some(root_cause) = patch.root_cause {
            self.root_cause = Some(root_cause);
        }
        if let Some(status) = patch.status {
            self.status = status;
            if status == IncidentStatus::Resolved && self.resolved_at.is_none() {
                self.resolved_at = Some(Utc::now());
            }
        }

        self.updated = Utc::now();

        (previous != self.status).then_some(previous)
    }

    /// Open or under investigation
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            IncidentStatus::Open | IncidentStatus::Investigating
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    EnumIter,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IncidentCategory {
    Bug,
    Performance,
    Security,
    Configuration,
    Infrastructure,
    Deployment,
    Integration,
    Data,
    Other,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    Display,
    EnumIter,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Check if severity requires immediate attention
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// Incident lifecycle. Transitions are not constrained beyond enum membership.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    EnumIter,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IncidentStatus {
    #[default]
    Open,
    Investigating,
    Resolved,
    Archived,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Frequency {
    Once,
    Intermittent,
    Recurring,
    Constant,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    EnumString,
    Display,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Visibility {
    Private,
    #[default]
    Team,
    Public,
}

/// Input for creating an incident
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct NewIncident {
    /// Short human-readable title
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// Incident category
    pub category: IncidentCategory,

    /// Detailed description of what happened
    #[validate(length(min = 1, max = 10000))]
    pub description: String,

    /// Severity level
    pub severity: Severity,

    /// Initial status (defaults to open)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,

    /// Observable symptoms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,

    /// Surrounding context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Affected environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// How often it happens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,

    /// Who may see the incident (defaults to team)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,

    /// Root cause, if already known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

/// Partial update of an incident; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, JsonSchema)]
pub struct IncidentPatch {
    #[validate(length(min = 1, max = 200))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<IncidentCategory>,

    #[validate(length(min = 1, max = 10000))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

impl IncidentPatch {
    /// Patch that only changes the status
    pub fn status(status: IncidentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.status.is_none()
            && self.symptoms.is_none()
            && self.context.is_none()
            && self.environment.is_none()
            && self.frequency.is_none()
            && self.visibility.is_none()
            && self.root_cause.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn new_incident(title: &str) -> NewIncident {
        NewIncident {
            title: title.to_string(),
            category: IncidentCategory::Performance,
            description: "Checkout latency above 2s".to_string(),
            severity: Severity::High,
            status: None,
            symptoms: Some("slow pages".to_string()),
            context: None,
            environment: Some("production".to_string()),
            frequency: Some(Frequency::Intermittent),
            visibility: None,
            root_cause: None,
        }
    }

    #[test]
    fn test_incident_creation_defaults() {
        let incident = Incident::from_new("abc".to_string(), new_incident("Slow checkout"));

        assert_eq!(incident.status, IncidentStatus::Open);
        assert_eq!(incident.visibility, Visibility::Team);
        assert_eq!(incident.severity, Severity::High);
        assert!(incident.resolved_at.is_none());
        assert!(incident.is_active());
    }

    #[test]
    fn test_matches_query_is_case_insensitive() {
        let incident = Incident::from_new("abc".to_string(), new_incident("Slow CHECKOUT"));

        assert!(incident.matches_query("checkout"));
        assert!(incident.matches_query("LATENCY"));
        assert!(!incident.matches_query("database"));
    }

    #[test]
    fn test_patch_status_stamps_resolution() {
        let mut incident = Incident::from_new("abc".to_string(), new_incident("Slow checkout"));

        let previous = incident.apply_patch(IncidentPatch::status(IncidentStatus::Resolved));

        assert_eq!(previous, Some(IncidentStatus::Open));
        assert_eq!(incident.status, IncidentStatus::Resolved);
        assert!(incident.resolved_at.is_some());
        assert!(!incident.is_active());
    }

    #[test]
    fn test_patch_without_status_change() {
        let mut incident = Incident::from_new("abc".to_string(), new_incident("Slow checkout"));

        let previous = incident.apply_patch(IncidentPatch {
            root_cause: Some("N+1 query".to_string()),
            ..Default::default()
        });

        assert!(previous.is_none());
        assert_eq!(incident.root_cause.as_deref(), Some("N+1 query"));
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(IncidentStatus::Investigating.to_string(), "investigating");
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert!(Severity::Critical > Severity::Low);
        assert!(Severity::High.is_urgent());
    }

    #[test]
    fn test_deserialize_pocketbase_record() {
        let json = serde_json::json!({
            "id": "r1x2y3z4w5v6u7t",
            "collectionId": "pbc_123",
            "collectionName": "incidents",
            "title": "DB outage",
            "category": "infrastructure",
            "description": "Primary went down",
            "severity": "critical",
            "status": "investigating",
            "symptoms": "",
            "context": "",
            "environment": "prod",
            "frequency": "",
            "visibility": "",
            "root_cause": "",
            "resolved_at": "",
            "created": "2024-05-01 10:11:12.123Z",
            "updated": "2024-05-01 10:11:12.123Z"
        });

        let incident: Incident = serde_json::from_value(json).unwrap();
        assert_eq!(incident.status, IncidentStatus::Investigating);
        assert!(incident.symptoms.is_none());
        assert!(incident.frequency.is_none());
        assert_eq!(incident.visibility, Visibility::Team);
        assert_eq!(incident.environment.as_deref(), Some("prod"));
    }

    #[test]
    fn test_validation_rejects_empty_title() {
        let mut input = new_incident("");
        assert!(input.validate().is_err());
        input.title = "ok".to_string();
        assert!(input.validate().is_ok());
    }
}
