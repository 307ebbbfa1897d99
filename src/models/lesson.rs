use super::incident::IncidentCategory;
use super::serde_helpers::timestamp;
use super::RecordId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

/// A lesson learned from an incident (`lessons_learned` collection)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub id: RecordId,
    pub incident_id: RecordId,
    pub title: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub prevention: String,
    pub lesson_type: LessonType,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

impl Lesson {
    pub fn from_draft(id: RecordId, incident_id: RecordId, draft: LessonDraft) -> Self {
        let now = Utc::now();
        Self {
            id,
            incident_id,
            title: draft.title,
            problem: draft.problem,
            root_cause: draft.root_cause,
            prevention: draft.prevention,
            lesson_type: draft.lesson_type.unwrap_or(LessonType::Technical),
            created: now,
            updated: now,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LessonType {
    Technical,
    Process,
    Communication,
    Tooling,
    Prevention,
}

impl LessonType {
    /// Lesson type implied by an incident category
    pub fn for_category(category: IncidentCategory) -> Self {
        match category {
            IncidentCategory::Configuration | IncidentCategory::Deployment => LessonType::Process,
            IncidentCategory::Integration => LessonType::Tooling,
            IncidentCategory::Security => LessonType::Prevention,
            IncidentCategory::Bug
            | IncidentCategory::Performance
            | IncidentCategory::Infrastructure
            | IncidentCategory::Data
            | IncidentCategory::Other => LessonType::Technical,
        }
    }
}

/// Explicit lesson content supplied by a caller
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct LessonDraft {
    /// Short title of the lesson
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// What went wrong
    #[serde(default)]
    pub problem: String,

    /// Why it went wrong
    #[serde(default)]
    pub root_cause: String,

    /// How to avoid it next time
    #[serde(default)]
    pub prevention: String,

    /// Kind of lesson (defaults from the incident category)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_type: Option<LessonType>,
}
