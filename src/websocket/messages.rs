//! WebSocket message protocol
//!
//! Messages are JSON objects tagged by `type`. Clients subscribe with filters
//! and receive knowledge-base events as they happen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::models::{
    Incident, IncidentCategory, IncidentStatus, Lesson, RecordId, Severity, Solution,
};

/// Message sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to events matching `filters`
    Subscribe {
        subscription_id: String,
        #[serde(default)]
        filters: SubscriptionFilters,
    },
    /// Drop a subscription
    Unsubscribe { subscription_id: String },
    /// Keep-alive; echoed back as `pong`
    Ping {
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
}

/// Message sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        session_id: String,
        server_time: DateTime<Utc>,
    },
    Subscribed {
        subscription_id: String,
        filters: SubscriptionFilters,
    },
    Unsubscribed {
        subscription_id: String,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Event {
        message_id: String,
        event: Event,
        timestamp: DateTime<Utc>,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Subscription filters; an empty list matches everything
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SubscriptionFilters {
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub statuses: Vec<IncidentStatus>,
    #[serde(default)]
    pub categories: Vec<IncidentCategory>,
    #[serde(default)]
    pub incident_ids: Vec<RecordId>,
}

impl SubscriptionFilters {
    /// Check if an incident matches these filters
    pub fn matches_incident(&self, incident: &Incident) -> bool {
        (self.severities.is_empty() || self.severities.contains(&incident.severity))
            && (self.statuses.is_empty() || self.statuses.contains(&incident.status))
            && (self.categories.is_empty() || self.categories.contains(&incident.category))
            && (self.incident_ids.is_empty() || self.incident_ids.contains(&incident.id))
    }

    /// Check if an event type matches these filters
    pub fn matches_event_type(&self, event_type: &EventType) -> bool {
        self.event_types.is_empty() || self.event_types.contains(event_type)
    }

    /// Full check against an event and the incident it concerns
    pub fn matches(&self, event: &Event) -> bool {
        self.matches_event_type(&event.event_type()) && self.matches_incident(event.incident())
    }
}

/// Type of event
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    IncidentCreated,
    IncidentUpdated,
    IncidentDeleted,
    SolutionAdded,
    LessonsExtracted,
}

/// Event payload. Every event carries the incident it concerns so
/// subscription filters apply uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Event {
    IncidentCreated {
        incident: Incident,
    },
    IncidentUpdated {
        incident: Incident,
        previous_status: Option<IncidentStatus>,
    },
    /// Snapshot of the incident as it was before deletion
    IncidentDeleted {
        incident: Incident,
    },
    SolutionAdded {
        incident: Incident,
        solution: Solution,
    },
    LessonsExtracted {
        incident: Incident,
        lessons: Vec<Lesson>,
    },
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::IncidentCreated { .. } => EventType::IncidentCreated,
            Event::IncidentUpdated { .. } => EventType::IncidentUpdated,
            Event::IncidentDeleted { .. } => EventType::IncidentDeleted,
            Event::SolutionAdded { .. } => EventType::SolutionAdded,
            Event::LessonsExtracted { .. } => EventType::LessonsExtracted,
        }
    }

    /// The incident this event concerns
    pub fn incident(&self) -> &Incident {
        match self {
            Event::IncidentCreated { incident }
            | Event::IncidentUpdated { incident, .. }
            | Event::IncidentDeleted { incident }
            | Event::SolutionAdded { incident, .. }
            | Event::LessonsExtracted { incident, .. } => incident,
        }
    }

    pub fn incident_id(&self) -> &str {
        &self.incident().id
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::*;

    pub fn incident(severity: Severity) -> Incident {
        Incident::from_new(
            generate_record_id(),
            NewIncident {
                title: "Queue backlog".to_string(),
                category: IncidentCategory::Infrastructure,
                description: "Consumers stalled".to_string(),
                severity,
                status: None,
                symptoms: None,
                context: None,
                environment: None,
                frequency: None,
                visibility: None,
                root_cause: None,
            },
        )
    }
}
