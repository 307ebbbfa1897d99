use super::{Incident, Lesson, Solution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One incident with everything learned from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub incident: Incident,
    pub solutions: Vec<Solution>,
    pub lessons: Vec<Lesson>,
}

/// Denormalized knowledge projection, assembled at export time and never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeExport {
    pub generated_at: DateTime<Utc>,
    /// Human-readable description of the filter that produced this export
    pub filter: String,
    pub total_incidents: usize,
    pub total_solutions: usize,
    pub total_lessons: usize,
    pub entries: Vec<KnowledgeEntry>,
}

impl KnowledgeExport {
    pub fn new(filter: String, entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            generated_at: Utc::now(),
            filter,
            total_incidents: entries.len(),
            total_solutions: entries.iter().map(|e| e.solutions.len()).sum(),
            total_lessons: entries.iter().map(|e| e.lessons.len()).sum(),
            entries,
        }
    }
}

/// Incident counts broken down by status, severity and category
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeStats {
    pub total_incidents: u64,
    pub active_incidents: u64,
    pub total_lessons: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
}

impl KnowledgeStats {
    pub fn record(&mut self, incident: &Incident) {
        self.total_incidents += 1;
        if incident.is_active() {
            self.active_incidents += 1;
        }
        *self.by_status.entry(incident.status.to_string()).or_insert(0) += 1;
        *self
            .by_severity
            .entry(incident.severity.to_string())
            .or_insert(0) += 1;
        *self
            .by_category
            .entry(incident.category.to_string())
            .or_insert(0) += 1;
    }
}
