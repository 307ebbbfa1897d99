pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::{processing::KnowledgeService, websocket::WebSocketState};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<KnowledgeService>,
    pub websocket: Option<Arc<WebSocketState>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<KnowledgeService>) -> Self {
        Self {
            service,
            websocket: None,
            started_at: Instant::now(),
        }
    }

    /// Enable the `/ws` endpoint
    pub fn with_websocket(mut self, websocket: Arc<WebSocketState>) -> Self {
        self.websocket = Some(websocket);
        self
    }
}
