//! Prometheus metrics for the knowledge-base service.
//!
//! Covers HTTP traffic, knowledge operations, storage and cache behaviour,
//! WebSocket fan-out, MCP tool calls and the Code Mode agent router.
//!
//! # Example
//! ```no_run
//! use incident_kb::metrics::HTTP_REQUESTS_TOTAL;
//!
//! HTTP_REQUESTS_TOTAL
//!     .with_label_values(&["GET", "/health", "200"])
//!     .inc();
//! ```
mod middleware;

pub use middleware::track_metrics;

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};

const NAMESPACE: &str = "incident_kb";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    pub static ref HTTP_CONNECTIONS_ACTIVE: Gauge = Gauge::with_opts(
        Opts::new("http_connections_active", "Number of in-flight HTTP requests").namespace(NAMESPACE)
    ).expect("Failed to create HTTP_CONNECTIONS_ACTIVE metric");

    // ============================================================================
    // Knowledge Metrics
    // ============================================================================

    /// Incidents recorded. Labels: severity, category
    pub static ref INCIDENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("incidents_total", "Total number of incidents recorded").namespace(NAMESPACE),
        &["severity", "category"]
    ).expect("Failed to create INCIDENTS_TOTAL metric");

    /// Labels: from, to
    pub static ref INCIDENT_STATUS_CHANGES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("incident_status_changes_total", "Incident status transitions").namespace(NAMESPACE),
        &["from", "to"]
    ).expect("Failed to create INCIDENT_STATUS_CHANGES_TOTAL metric");

    pub static ref SOLUTIONS_TOTAL: Counter = Counter::with_opts(
        Opts::new("solutions_total", "Total number of solutions added").namespace(NAMESPACE)
    ).expect("Failed to create SOLUTIONS_TOTAL metric");

    /// Labels: mode (derived, explicit)
    pub static ref LESSONS_EXTRACTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("lessons_extracted_total", "Total number of lessons extracted").namespace(NAMESPACE),
        &["mode"]
    ).expect("Failed to create LESSONS_EXTRACTED_TOTAL metric");

    /// Labels: format
    pub static ref KNOWLEDGE_EXPORTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("knowledge_exports_total", "Total number of knowledge exports").namespace(NAMESPACE),
        &["format"]
    ).expect("Failed to create KNOWLEDGE_EXPORTS_TOTAL metric");

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    /// Labels: operation, backend
    pub static ref STORAGE_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("storage_operations_total", "Total number of storage operations").namespace(NAMESPACE),
        &["operation", "backend"]
    ).expect("Failed to create STORAGE_OPERATIONS_TOTAL metric");

    /// Labels: operation, backend
    pub static ref STORAGE_OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("storage_operation_duration_seconds", "Storage operation duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["operation", "backend"]
    ).expect("Failed to create STORAGE_OPERATION_DURATION_SECONDS metric");

    /// Labels: cache, result (hit, miss)
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_lookups_total", "Cache lookups by outcome").namespace(NAMESPACE),
        &["cache", "result"]
    ).expect("Failed to create CACHE_LOOKUPS_TOTAL metric");

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    pub static ref WEBSOCKET_CONNECTIONS_ACTIVE: Gauge = Gauge::with_opts(
        Opts::new("websocket_connections_active", "Number of open WebSocket sessions").namespace(NAMESPACE)
    ).expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric");

    /// Labels: direction (inbound, outbound)
    pub static ref WEBSOCKET_MESSAGES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("websocket_messages_total", "WebSocket messages by direction").namespace(NAMESPACE),
        &["direction"]
    ).expect("Failed to create WEBSOCKET_MESSAGES_TOTAL metric");

    /// Labels: event_type
    pub static ref EVENTS_BROADCAST_TOTAL: CounterVec = CounterVec::new(
        Opts::new("events_broadcast_total", "Knowledge events published").namespace(NAMESPACE),
        &["event_type"]
    ).expect("Failed to create EVENTS_BROADCAST_TOTAL metric");

    // ============================================================================
    // Tool Metrics
    // ============================================================================

    /// Labels: tool, status
    pub static ref TOOL_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("tool_calls_total", "MCP tool invocations").namespace(NAMESPACE),
        &["tool", "status"]
    ).expect("Failed to create TOOL_CALLS_TOTAL metric");

    /// Labels: tool
    pub static ref TOOL_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("tool_call_duration_seconds", "MCP tool call duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["tool"]
    ).expect("Failed to create TOOL_CALL_DURATION_SECONDS metric");

    /// Labels: tool, route (wrapper, direct)
    pub static ref AGENT_ROUTED_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("agent_routed_calls_total", "Agent tool calls by route").namespace(NAMESPACE),
        &["tool", "route"]
    ).expect("Failed to create AGENT_ROUTED_CALLS_TOTAL metric");

    // ============================================================================
    // Error & System Metrics
    // ============================================================================

    /// Labels: component, error_type
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("errors_total", "Total number of errors").namespace(NAMESPACE),
        &["component", "error_type"]
    ).expect("Failed to create ERRORS_TOTAL metric");

    /// Labels: version, backend
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Application build information").namespace(NAMESPACE),
        &["version", "backend"]
    ).expect("Failed to create BUILD_INFO metric");

    pub static ref UPTIME_SECONDS: Gauge = Gauge::with_opts(
        Opts::new("uptime_seconds", "Application uptime in seconds").namespace(NAMESPACE)
    ).expect("Failed to create UPTIME_SECONDS metric");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics that are already registered are skipped.
pub fn init_metrics(backend: &str) -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(HTTP_CONNECTIONS_ACTIVE.clone()),
        Box::new(INCIDENTS_TOTAL.clone()),
        Box::new(INCIDENT_STATUS_CHANGES_TOTAL.clone()),
        Box::new(SOLUTIONS_TOTAL.clone()),
        Box::new(LESSONS_EXTRACTED_TOTAL.clone()),
        Box::new(KNOWLEDGE_EXPORTS_TOTAL.clone()),
        Box::new(STORAGE_OPERATIONS_TOTAL.clone()),
        Box::new(STORAGE_OPERATION_DURATION_SECONDS.clone()),
        Box::new(CACHE_LOOKUPS_TOTAL.clone()),
        Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()),
        Box::new(WEBSOCKET_MESSAGES_TOTAL.clone()),
        Box::new(EVENTS_BROADCAST_TOTAL.clone()),
        Box::new(TOOL_CALLS_TOTAL.clone()),
        Box::new(TOOL_CALL_DURATION_SECONDS.clone()),
        Box::new(AGENT_ROUTED_CALLS_TOTAL.clone()),
        Box::new(ERRORS_TOTAL.clone()),
        Box::new(BUILD_INFO.clone()),
        Box::new(UPTIME_SECONDS.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION"), backend])
        .set(1.0);

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Spawn a task that keeps `uptime_seconds` current
pub fn spawn_uptime_tracker() -> tokio::task::JoinHandle<()> {
    let started = std::time::Instant::now();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            interval.tick().await;
            UPTIME_SECONDS.set(started.elapsed().as_secs_f64());
        }
    })
}

/// Render all metrics in the Prometheus text exposition format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Count an error against a component, labelled by `AppError::error_code`
pub fn record_error(component: &str, error: &crate::error::AppError) {
    ERRORS_TOTAL
        .with_label_values(&[component, error.error_code()])
        .inc();
}
