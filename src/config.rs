use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Storage backend configuration
    pub storage: StorageConfig,

    /// Query cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// WebSocket broadcast configuration
    #[serde(default)]
    pub websocket: WebSocketSettings,

    /// Code Mode agent helper configuration
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration layering the embedded defaults, `path` and `KB__*` env vars
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(path).required(false))
            // Override with environment variables (prefix: KB_)
            .add_source(
                config::Environment::with_prefix("KB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Configuration built only from the embedded defaults
    pub fn embedded_default() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: StorageBackend,

    /// PocketBase base URL
    #[serde(default = "default_pocketbase_url")]
    pub pocketbase_url: String,

    /// Superuser email (optional; anonymous access when unset)
    pub admin_email: Option<String>,

    /// Name of the env var holding the superuser password
    #[serde(default = "default_admin_password_env")]
    pub admin_password_env: String,

    /// PocketBase request timeout (seconds)
    #[serde(default = "default_pocketbase_timeout")]
    pub timeout_secs: u64,

    /// Path for the embedded sled database
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Pocketbase,
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the TTL query cache in front of the store
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry time-to-live (seconds)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of cached query results
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSettings {
    /// Enable the /ws endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Heartbeat interval (seconds)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,

    /// Idle session timeout (seconds)
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Broadcast channel capacity
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_secs: default_heartbeat(),
            session_timeout_secs: default_session_timeout(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Route used when a tool has no override
    #[serde(default)]
    pub default_route: RouteKind,

    /// Per-tool route overrides
    #[serde(default)]
    pub route_overrides: HashMap<String, RouteKind>,

    /// Redact PII from logged/audited payloads
    #[serde(default = "default_true")]
    pub redact_logs: bool,

    /// Fraction of calls whose full (redacted) payload is logged
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Results larger than this many characters are chunked
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// TTL of cached read-only tool results (seconds)
    #[serde(default = "default_tool_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// JSON-lines audit log path
    #[serde(default = "default_audit_path")]
    pub audit_path: PathBuf,

    /// Feedback scoreboard path
    #[serde(default = "default_feedback_path")]
    pub feedback_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_route: RouteKind::default(),
            route_overrides: HashMap::new(),
            redact_logs: true,
            sample_rate: default_sample_rate(),
            chunk_size: default_chunk_size(),
            cache_ttl_secs: default_tool_cache_ttl(),
            audit_path: default_audit_path(),
            feedback_path: default_feedback_path(),
        }
    }
}

/// How an agent tool call is dispatched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Through the Code Mode wrapper (logging, redaction, cache, chunking)
    #[default]
    Wrapper,
    /// Straight to the tool dispatch table
    Direct,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Wrapper => "wrapper",
            RouteKind::Direct => "direct",
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3001
}

fn default_request_timeout() -> u64 {
    30
}

fn default_pocketbase_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_admin_password_env() -> String {
    "POCKETBASE_ADMIN_PASSWORD".to_string()
}

fn default_pocketbase_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_cache_capacity() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "incident-kb".to_string()
}

fn default_true() -> bool {
    true
}

fn default_heartbeat() -> u64 {
    30
}

fn default_session_timeout() -> u64 {
    300 // 5 minutes
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_sample_rate() -> f64 {
    0.1
}

fn default_chunk_size() -> usize {
    4000
}

fn default_tool_cache_ttl() -> u64 {
    300
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("data/agent/audit.jsonl")
}

fn default_feedback_path() -> PathBuf {
    PathBuf::from("data/agent/feedback.json")
}
