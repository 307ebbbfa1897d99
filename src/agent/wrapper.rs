//! Code Mode client: the instrumented path agents use to call tools
//!
//! Every call is logged with redacted arguments (the full payload only for a
//! sampled fraction), read-only results are cached by argument hash, large
//! results come back chunked, and outcomes land in the audit log and the
//! feedback board.

use crate::agent::audit::{AuditEntry, AuditLog};
use crate::agent::catalog;
use crate::agent::chunk::{chunk_value, ChunkedResult, MAX_CHUNKS};
use crate::agent::feedback::FeedbackStore;
use crate::agent::redact::{redact, redact_value};
use crate::config::{AgentConfig, RouteKind};
use crate::error::{AppError, Result};
use crate::mcp::tools;
use crate::metrics::CACHE_LOOKUPS_TOTAL;
use crate::processing::KnowledgeService;
use crate::state::{AppCache, CacheStats};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TOOL_CACHE_CAPACITY: u64 = 1_000;

/// Something that can execute a named tool
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool: &str, args: Value) -> Result<Value>;
}

/// Invokes tools in-process through the shared dispatch table
pub struct ServiceInvoker {
    service: Arc<KnowledgeService>,
}

impl ServiceInvoker {
    pub fn new(service: Arc<KnowledgeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolInvoker for ServiceInvoker {
    async fn invoke(&self, tool: &str, args: Value) -> Result<Value> {
        tools::dispatch(&self.service, tool, args).await
    }
}

/// Result body: whole, or split when it exceeds the chunk size
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolPayload {
    Complete(Value),
    Chunked(ChunkedResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub tool: String,
    pub route: RouteKind,
    pub cached: bool,
    pub duration_ms: u64,
    pub result: ToolPayload,
}

/// Cache key: tool name plus the SHA-256 of its canonical JSON arguments
pub fn cache_key(tool: &str, args: &Value) -> String {
    // serde_json maps are ordered, so equal arguments serialize identically
    let canonical = serde_json::to_string(args).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{}:{:x}", tool, digest)
}

fn should_sample(rate: f64) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 {
        false
    } else {
        rand::random::<f64>() < rate
    }
}

pub struct CodeModeClient {
    invoker: Arc<dyn ToolInvoker>,
    cache: AppCache<String, Value>,
    audit: Option<Arc<AuditLog>>,
    feedback: Option<Arc<FeedbackStore>>,
    redact_logs: bool,
    sample_rate: f64,
    chunk_size: usize,
}

impl CodeModeClient {
    pub fn new(invoker: Arc<dyn ToolInvoker>, config: &AgentConfig) -> Self {
        Self {
            invoker,
            cache: AppCache::new(
                TOOL_CACHE_CAPACITY,
                Duration::from_secs(config.cache_ttl_secs.max(1)),
            ),
            audit: None,
            feedback: None,
            redact_logs: config.redact_logs,
            sample_rate: config.sample_rate,
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<FeedbackStore>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Arguments as they may appear in logs and the audit trail
    pub fn loggable_args(&self, args: &Value) -> Value {
        if self.redact_logs {
            redact_value(args)
        } else {
            args.clone()
        }
    }

    /// Error text as it may appear in logs and the audit trail
    pub fn loggable_error(&self, error: &AppError) -> String {
        if self.redact_logs {
            redact(&error.to_string())
        } else {
            error.to_string()
        }
    }

    pub async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput> {
        let start = Instant::now();
        let logged_args = self.loggable_args(&args);

        if should_sample(self.sample_rate) {
            tracing::info!(tool = %tool, args = %logged_args, "Tool call (sampled payload)");
        } else {
            tracing::info!(tool = %tool, "Tool call");
        }

        let read_only = catalog::is_read_only(tool);
        let key = cache_key(tool, &args);

        if read_only {
            if let Some(value) = self.cache.get(&key).await {
                CACHE_LOOKUPS_TOTAL
                    .with_label_values(&["tool_results", "hit"])
                    .inc();
                tracing::debug!(tool = %tool, "Serving tool result from cache");
                let duration_ms = start.elapsed().as_millis() as u64;
                self.record(tool, logged_args, duration_ms, None).await;
                return Ok(self.output(tool, value, true, duration_ms));
            }
            CACHE_LOOKUPS_TOTAL
                .with_label_values(&["tool_results", "miss"])
                .inc();
        }

        let result = self.invoker.invoke(tool, args).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                if read_only {
                    self.cache.insert(key, value.clone()).await;
                } else {
                    // A write may have changed anything a cached read returned
                    self.cache.invalidate_all().await;
                }
                self.record(tool, logged_args, duration_ms, None).await;
                Ok(self.output(tool, value, false, duration_ms))
            }
            Err(e) => {
                let error = self.loggable_error(&e);
                tracing::warn!(tool = %tool, error = %error, duration_ms, "Tool call failed");
                self.record(tool, logged_args, duration_ms, Some(error)).await;
                Err(e)
            }
        }
    }

    fn output(&self, tool: &str, value: Value, cached: bool, duration_ms: u64) -> ToolOutput {
        let size = serde_json::to_string(&value)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        let result = if size > self.chunk_size {
            ToolPayload::Chunked(chunk_value(&value, self.chunk_size, MAX_CHUNKS))
        } else {
            ToolPayload::Complete(value)
        };

        ToolOutput {
            tool: tool.to_string(),
            route: RouteKind::Wrapper,
            cached,
            duration_ms,
            result,
        }
    }

    /// Audit and feedback failures are logged, never surfaced to the caller
    async fn record(&self, tool: &str, args: Value, duration_ms: u64, error: Option<String>) {
        let success = error.is_none();
        if let Some(audit) = &self.audit {
            let entry = AuditEntry::new(tool, RouteKind::Wrapper, args).finish(duration_ms, error);
            if let Err(e) = audit.record(&entry).await {
                tracing::warn!(error = %e, path = %audit.path().display(), "Failed to write audit entry");
            }
        }
        if let Some(feedback) = &self.feedback {
            if let Err(e) = feedback.record_call(tool, success).await {
                tracing::warn!(error = %e, "Failed to update tool feedback");
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn invalidate_cache(&self) {
        self.cache.invalidate_all().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::AppError;
    use parking_lot::Mutex;

    /// Records every invocation and replies with a canned value
    pub struct RecordingInvoker {
        pub calls: Mutex<Vec<(String, Value)>>,
        pub reply: Value,
    }

    impl RecordingInvoker {
        pub fn new(reply: Value) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply,
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ToolInvoker for RecordingInvoker {
        async fn invoke(&self, tool: &str, args: Value) -> Result<Value> {
            self.calls.lock().push((tool.to_string(), args));
            if tool == "fail" {
                return Err(AppError::NotFound("incidents/missing".to_string()));
            }
            Ok(self.reply.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingInvoker;
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn config() -> AgentConfig {
        AgentConfig {
            sample_rate: 0.0,
            chunk_size: 200,
            ..Default::default()
        }
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = cache_key("get_incident", &json!({ "id": "x", "extra": 1 }));
        let b = cache_key("get_incident", &json!({ "extra": 1, "id": "x" }));
        let c = cache_key("get_incident", &json!({ "id": "y" }));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("get_incident:"));
        assert_eq!(a.len(), "get_incident:".len() + 64);
    }

    #[test]
    fn test_sampling_bounds() {
        assert!(should_sample(1.0));
        assert!(!should_sample(0.0));
    }

    #[tokio::test]
    async fn test_read_only_results_are_cached() {
        let invoker = Arc::new(RecordingInvoker::new(json!({ "id": "abc" })));
        let client = CodeModeClient::new(invoker.clone(), &config());

        let first = client
            .call(tools::GET_INCIDENT, json!({ "id": "abc" }))
            .await
            .unwrap();
        let second = client
            .call(tools::GET_INCIDENT, json!({ "id": "abc" }))
            .await
            .unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(invoker.call_count(), 1);
        assert_eq!(second.result, ToolPayload::Complete(json!({ "id": "abc" })));
    }

    #[tokio::test]
    async fn test_writes_bypass_and_clear_cache() {
        let invoker = Arc::new(RecordingInvoker::new(json!({ "ok": true })));
        let client = CodeModeClient::new(invoker.clone(), &config());

        client.call(tools::GET_INCIDENT, json!({ "id": "a" })).await.unwrap();
        client.call(tools::CREATE_INCIDENT, json!({})).await.unwrap();
        client.call(tools::CREATE_INCIDENT, json!({})).await.unwrap();
        let reread = client.call(tools::GET_INCIDENT, json!({ "id": "a" })).await.unwrap();

        assert!(!reread.cached);
        assert_eq!(invoker.call_count(), 4);
    }

    #[tokio::test]
    async fn test_large_results_are_chunked() {
        let items: Vec<Value> = (0..50).map(|i| json!({ "n": i, "pad": "xxxxxxxx" })).collect();
        let invoker = Arc::new(RecordingInvoker::new(Value::Array(items)));
        let client = CodeModeClient::new(invoker, &config());

        let output = client.call(tools::LIST_INCIDENTS, json!({})).await.unwrap();
        match output.result {
            ToolPayload::Chunked(chunked) => {
                assert!(chunked.total_chunks > 1);
                assert!(!chunked.truncated);
            }
            other => panic!("expected chunked payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_audit_and_feedback_are_recorded_redacted() {
        let dir = tempdir().unwrap();
        let audit = Arc::new(AuditLog::new(dir.path().join("audit.jsonl")));
        let feedback = Arc::new(FeedbackStore::new(dir.path().join("feedback.json")));
        let invoker = Arc::new(RecordingInvoker::new(json!({})));
        let client = CodeModeClient::new(invoker, &config())
            .with_audit(audit.clone())
            .with_feedback(feedback.clone());

        client
            .call(tools::CREATE_INCIDENT, json!({ "title": "from ops@example.com" }))
            .await
            .unwrap();
        assert!(client.call("fail", json!({})).await.is_err());

        let entries = audit.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].args["title"], "from [EMAIL]");
        assert!(entries[0].success);
        assert!(!entries[1].success);
        assert!(entries[1].error.as_deref().unwrap().contains("Not found"));

        let board = feedback.load().await.unwrap();
        assert_eq!(board["create_incident"].successes, 1);
        assert_eq!(board["fail"].failures, 1);
    }
}
