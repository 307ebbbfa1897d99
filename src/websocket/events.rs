//! Event envelopes and broadcast statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::Severity;

pub use super::messages::{Event, EventType};

/// Internal event envelope for broadcasting
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
    pub priority: EventPriority,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            priority: EventPriority::from_event(&event),
            event,
        }
    }
}

/// Event priority, used for log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl EventPriority {
    /// Determine priority from event content
    pub fn from_event(event: &Event) -> Self {
        match event {
            Event::IncidentDeleted { .. } => EventPriority::Low,
            Event::IncidentCreated { incident } | Event::IncidentUpdated { incident, .. } => {
                match incident.severity {
                    Severity::Critical => EventPriority::Critical,
                    Severity::High => EventPriority::High,
                    _ => EventPriority::Normal,
                }
            }
            Event::SolutionAdded { .. } | Event::LessonsExtracted { .. } => EventPriority::Normal,
        }
    }
}

/// Event statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub last_event_time: Option<DateTime<Utc>>,
}

impl EventStats {
    pub fn record_event(&mut self, event_type: EventType) {
        self.total_events += 1;
        *self
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;
        self.last_event_time = Some(Utc::now());
    }
}
