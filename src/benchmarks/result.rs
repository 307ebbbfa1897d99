//! Benchmark result records
//!
//! One `BenchmarkResult` per scenario. Metrics stay a free-form JSON object so
//! the summary renderer and stored results tolerate new fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Scenario identifier
    pub target_id: String,

    pub metrics: Value,

    pub timestamp: DateTime<Utc>,
}

impl BenchmarkResult {
    pub fn new(target_id: impl Into<String>, metrics: Value) -> Self {
        Self {
            target_id: target_id.into(),
            metrics,
            timestamp: Utc::now(),
        }
    }

    /// No `error` field, or a null one
    pub fn is_success(&self) -> bool {
        !self.metrics.get("error").is_some_and(|e| !e.is_null())
    }

    pub fn get_metric(&self, key: &str) -> Option<&Value> {
        self.metrics.get(key)
    }

    fn u64_metric(&self, key: &str) -> Option<u64> {
        self.metrics.get(key).and_then(Value::as_u64)
    }

    /// Tokens needed to load every raw tool schema up front
    pub fn baseline_tokens(&self) -> Option<u64> {
        self.u64_metric("baseline_tokens")
    }

    /// Tokens needed with progressive discovery
    pub fn code_mode_tokens(&self) -> Option<u64> {
        self.u64_metric("code_mode_tokens")
    }

    pub fn savings_percent(&self) -> Option<f64> {
        self.metrics.get("savings_percent").and_then(Value::as_f64)
    }
}

/// Builder that derives the savings fields from the two token counts
#[derive(Debug, Default)]
pub struct BenchmarkResultBuilder {
    target_id: String,
    metrics: Map<String, Value>,
    timestamp: Option<DateTime<Utc>>,
}

impl BenchmarkResultBuilder {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            ..Default::default()
        }
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.metric("description", json!(description.into()))
    }

    /// Record both token counts plus the absolute and relative saving
    pub fn tokens(self, baseline: u64, code_mode: u64) -> Self {
        let saved = baseline as i64 - code_mode as i64;
        let percent = if baseline == 0 {
            0.0
        } else {
            // Two decimals are plenty for the summary table
            (saved as f64 / baseline as f64 * 10_000.0).round() / 100.0
        };
        self.metric("baseline_tokens", json!(baseline))
            .metric("code_mode_tokens", json!(code_mode))
            .metric("tokens_saved", json!(saved))
            .metric("savings_percent", json!(percent))
    }

    pub fn tools_loaded(self, tools: &[&str]) -> Self {
        self.metric("tools_loaded", json!(tools))
    }

    pub fn error(self, message: impl Into<String>) -> Self {
        self.metric("error", json!(message.into()))
    }

    pub fn metric(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn build(self) -> BenchmarkResult {
        BenchmarkResult {
            target_id: self.target_id,
            metrics: Value::Object(self.metrics),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}
