//! Route agent tool calls through the Code Mode wrapper or straight to the
//! dispatch table, keeping per-route counters.

use crate::agent::audit::{AuditEntry, AuditLog};
use crate::agent::feedback::FeedbackStore;
use crate::agent::wrapper::{CodeModeClient, ToolInvoker, ToolOutput, ToolPayload};
use crate::config::{AgentConfig, RouteKind};
use crate::error::Result;
use crate::mcp::tools;
use crate::metrics::AGENT_ROUTED_CALLS_TOTAL;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct RouteCounters {
    calls: u64,
    errors: u64,
    total_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteMetrics {
    pub calls: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
    pub average_latency_ms: f64,
}

/// Point-in-time view of the router counters, keyed by route name
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterMetrics {
    pub routes: BTreeMap<String, RouteMetrics>,
}

impl RouterMetrics {
    pub fn route(&self, route: RouteKind) -> RouteMetrics {
        self.routes.get(route.as_str()).cloned().unwrap_or_default()
    }
}

pub struct ToolRouter {
    wrapper: CodeModeClient,
    direct: Arc<dyn ToolInvoker>,
    default_route: RouteKind,
    overrides: HashMap<String, RouteKind>,
    audit: Option<Arc<AuditLog>>,
    feedback: Option<Arc<FeedbackStore>>,
    counters: Mutex<HashMap<RouteKind, RouteCounters>>,
}

impl ToolRouter {
    pub fn new(invoker: Arc<dyn ToolInvoker>, config: &AgentConfig) -> Self {
        Self {
            wrapper: CodeModeClient::new(invoker.clone(), config),
            direct: invoker,
            default_route: config.default_route,
            overrides: config.route_overrides.clone(),
            audit: None,
            feedback: None,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Audit and feedback are shared by both routes
    pub fn with_recording(mut self, audit: Arc<AuditLog>, feedback: Arc<FeedbackStore>) -> Self {
        self.wrapper = self
            .wrapper
            .with_audit(audit.clone())
            .with_feedback(feedback.clone());
        self.audit = Some(audit);
        self.feedback = Some(feedback);
        self
    }

    pub fn route_for(&self, tool: &str) -> RouteKind {
        self.overrides
            .get(tool)
            .copied()
            .unwrap_or(self.default_route)
    }

    pub fn wrapper(&self) -> &CodeModeClient {
        &self.wrapper
    }

    pub fn audit(&self) -> Option<&Arc<AuditLog>> {
        self.audit.as_ref()
    }

    pub fn feedback(&self) -> Option<&Arc<FeedbackStore>> {
        self.feedback.as_ref()
    }

    pub async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput> {
        let route = self.route_for(tool);
        tracing::debug!(tool = %tool, route = route.as_str(), "Routing tool call");
        AGENT_ROUTED_CALLS_TOTAL
            .with_label_values(&[tools::metric_label(tool), route.as_str()])
            .inc();

        let start = Instant::now();
        let result = match route {
            RouteKind::Wrapper => self.wrapper.call(tool, args).await,
            RouteKind::Direct => self.call_direct(tool, args).await,
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let mut counters = self.counters.lock();
        let entry = counters.entry(route).or_default();
        entry.calls += 1;
        entry.total_latency_ms += elapsed_ms;
        if result.is_err() {
            entry.errors += 1;
        }
        drop(counters);

        result
    }

    async fn call_direct(&self, tool: &str, args: Value) -> Result<ToolOutput> {
        let start = Instant::now();
        let logged_args = self.wrapper.loggable_args(&args);
        let result = self.direct.invoke(tool, args).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let error = result.as_ref().err().map(|e| self.wrapper.loggable_error(e));
        if let Some(audit) = &self.audit {
            let entry =
                AuditEntry::new(tool, RouteKind::Direct, logged_args).finish(duration_ms, error);
            if let Err(e) = audit.record(&entry).await {
                tracing::warn!(error = %e, "Failed to write audit entry");
            }
        }
        if let Some(feedback) = &self.feedback {
            if let Err(e) = feedback.record_call(tool, result.is_ok()).await {
                tracing::warn!(error = %e, "Failed to update tool feedback");
            }
        }

        result.map(|value| ToolOutput {
            tool: tool.to_string(),
            route: RouteKind::Direct,
            cached: false,
            duration_ms,
            result: ToolPayload::Complete(value),
        })
    }

    pub fn metrics(&self) -> RouterMetrics {
        let counters = self.counters.lock();
        let routes = counters
            .iter()
            .map(|(route, c)| {
                let average = if c.calls == 0 {
                    0.0
                } else {
                    c.total_latency_ms as f64 / c.calls as f64
                };
                (
                    route.as_str().to_string(),
                    RouteMetrics {
                        calls: c.calls,
                        errors: c.errors,
                        total_latency_ms: c.total_latency_ms,
                        average_latency_ms: average,
                    },
                )
            })
            .collect();
        RouterMetrics { routes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::wrapper::test_support::RecordingInvoker;
    use serde_json::json;
    use tempfile::tempdir;

    fn config() -> AgentConfig {
        let mut config = AgentConfig {
            sample_rate: 0.0,
            ..Default::default()
        };
        config
            .route_overrides
            .insert(tools::CREATE_INCIDENT.to_string(), RouteKind::Direct);
        config
    }

    #[test]
    fn test_route_selection() {
        let router = ToolRouter::new(Arc::new(RecordingInvoker::new(json!({}))), &config());
        assert_eq!(router.route_for(tools::CREATE_INCIDENT), RouteKind::Direct);
        assert_eq!(router.route_for(tools::GET_INCIDENT), RouteKind::Wrapper);
    }

    #[tokio::test]
    async fn test_counts_calls_per_route() {
        let router = ToolRouter::new(Arc::new(RecordingInvoker::new(json!({}))), &config());

        let direct = router.call(tools::CREATE_INCIDENT, json!({})).await.unwrap();
        assert_eq!(direct.route, RouteKind::Direct);
        router.call(tools::GET_INCIDENT, json!({ "id": "a" })).await.unwrap();
        router.call(tools::GET_INCIDENT, json!({ "id": "b" })).await.unwrap();
        assert!(router.call("fail", json!({})).await.is_err());

        let metrics = router.metrics();
        assert_eq!(metrics.route(RouteKind::Direct).calls, 1);
        assert_eq!(metrics.route(RouteKind::Wrapper).calls, 3);
        assert_eq!(metrics.route(RouteKind::Wrapper).errors, 1);
        assert_eq!(metrics.route(RouteKind::Direct).errors, 0);
    }

    #[tokio::test]
    async fn test_direct_calls_are_audited() {
        let dir = tempdir().unwrap();
        let router = ToolRouter::new(Arc::new(RecordingInvoker::new(json!({}))), &config())
            .with_recording(
                Arc::new(AuditLog::new(dir.path().join("audit.jsonl"))),
                Arc::new(FeedbackStore::new(dir.path().join("feedback.json"))),
            );

        router
            .call(tools::CREATE_INCIDENT, json!({ "token": "secret-value" }))
            .await
            .unwrap();
        router.call(tools::GET_INCIDENT, json!({})).await.unwrap();

        let entries = router.audit().unwrap().recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].route, RouteKind::Direct);
        assert_eq!(entries[0].args["token"], "[API_KEY]");
        assert_eq!(entries[1].route, RouteKind::Wrapper);

        let board = router.feedback().unwrap().load().await.unwrap();
        assert_eq!(board["create_incident"].calls, 1);
        assert_eq!(board["get_incident"].calls, 1);
    }
}
