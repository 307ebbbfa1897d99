use anyhow::Context;
use clap::{Parser, Subcommand};
use incident_kb::{
    agent::{self, AuditLog, DetailLevel, FeedbackStore},
    api::{build_router, AppState},
    config::Config,
    mcp,
    metrics,
    processing::KnowledgeService,
    state::create_store,
    websocket::{cleanup_task, WebSocketState},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "incident-kb", version, about = "Incident knowledge base server")]
struct Args {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Admin API and WebSocket server (default)
    Serve,
    /// Serve MCP tools and resources over stdio
    Mcp,
    /// Code Mode helpers: tool discovery, routed calls, audit and feedback
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// Search the tool catalog
    Tools {
        #[arg(default_value = "")]
        query: String,

        /// name, summary or full
        #[arg(short, long, default_value = "summary")]
        detail: DetailLevel,
    },
    /// Call a tool through the configured route
    Call {
        tool: String,

        /// JSON object of arguments
        #[arg(default_value = "{}")]
        args: String,
    },
    /// Show the most recent audit entries
    Audit {
        #[arg(short = 'n', long, default_value = "20")]
        recent: usize,
    },
    /// Show the feedback board, or one tool's entry
    Feedback { tool: Option<String> },
    /// Rate a tool from 1 to 5
    Rate {
        tool: String,
        rating: u8,
        note: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let loaded = match path {
        Some(path) => Config::load_from(&path.to_string_lossy()),
        None => Config::load(),
    };
    match loaded {
        Ok(config) => Ok(config),
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Using built-in defaults");
            Config::embedded_default().context("Built-in configuration is invalid")
        }
    }
}

/// Logs go to stderr for MCP so stdout stays a clean protocol stream
fn init_tracing(config: &Config, to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "incident_kb={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });
    let writer = || {
        if to_stderr {
            BoxMakeWriter::new(std::io::stderr)
        } else {
            BoxMakeWriter::new(std::io::stdout)
        }
    };
    let json = config.observability.json_logs;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(writer())))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(writer())))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let command = args.command.unwrap_or(Command::Serve);

    init_tracing(&config, !matches!(command, Command::Serve));

    match command {
        Command::Serve => serve(config).await,
        Command::Mcp => {
            let service = build_service(&config).await?;
            mcp::serve_stdio(Arc::new(service)).await
        }
        Command::Agent { action } => run_agent(&config, action).await,
    }
}

async fn build_service(config: &Config) -> anyhow::Result<KnowledgeService> {
    tracing::info!(backend = ?config.storage.backend, "Initializing storage");
    let store = create_store(&config.storage, &config.cache)
        .await
        .context("Failed to initialize storage")?;

    if config.observability.prometheus_enabled {
        if let Err(e) = metrics::init_metrics(store.backend_name()) {
            tracing::warn!(error = %e, "Failed to initialize metrics, continuing without them");
        }
    }

    Ok(KnowledgeService::new(store))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        service = %config.observability.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting incident knowledge base"
    );

    let mut service = build_service(&config).await?;
    let mut app_state_ws = None;

    if config.websocket.enabled {
        let ws_state = Arc::new(WebSocketState::new(config.websocket.clone()));
        service = service.with_event_handlers(ws_state.handlers.clone());

        let cleanup_state = ws_state.clone();
        tokio::spawn(async move {
            cleanup_task(cleanup_state).await;
        });
        tracing::info!("WebSocket live updates enabled");
        app_state_ws = Some(ws_state);
    }

    if config.observability.prometheus_enabled {
        metrics::spawn_uptime_tracker();
    }

    let mut app_state = AppState::new(Arc::new(service));
    if let Some(ws_state) = app_state_ws {
        app_state = app_state.with_websocket(ws_state);
    }
    let app = build_router(
        app_state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(%addr, "Admin API listening");
    tracing::info!("   Health check: http://{}/health", addr);
    tracing::info!("   REST API: http://{}/api/incidents", addr);
    tracing::info!("   WebSocket: ws://{}/ws", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    })
    .await?;

    tracing::info!("Shut down gracefully");
    Ok(())
}

async fn run_agent(config: &Config, action: AgentAction) -> anyhow::Result<()> {
    let output = match action {
        AgentAction::Tools { query, detail } => {
            serde_json::to_value(agent::search_tools(&query, detail))?
        }
        AgentAction::Call { tool, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("Arguments must be a JSON object")?;
            let service = Arc::new(build_service(config).await?);
            let router = agent::build_router(service, &config.agent);
            let output = router.call(&tool, args).await?;
            serde_json::to_value(output)?
        }
        AgentAction::Audit { recent } => {
            let log = AuditLog::new(&config.agent.audit_path);
            serde_json::to_value(log.recent(recent).await?)?
        }
        AgentAction::Feedback { tool } => {
            let store = FeedbackStore::new(&config.agent.feedback_path);
            match tool {
                Some(tool) => serde_json::to_value(store.get(&tool).await?)?,
                None => serde_json::to_value(store.load().await?)?,
            }
        }
        AgentAction::Rate { tool, rating, note } => {
            let store = FeedbackStore::new(&config.agent.feedback_path);
            serde_json::to_value(store.rate(&tool, rating, note.as_deref()).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
