//! WebSocket live updates
//!
//! Clients connect to `/ws`, subscribe with filters and receive knowledge
//! events (`incident_created`, `incident_updated`, `incident_deleted`,
//! `solution_added`, `lessons_extracted`) as the service layer publishes them.
//!
//! - **Messages**: client/server protocol and event payloads
//! - **Events**: envelopes, priorities and statistics
//! - **Session**: subscription tracking per connection
//! - **Connection**: connection registry and filtered fanout
//! - **Broadcaster**: event publishing
//! - **Handlers**: hooks the service layer calls
//! - **Server**: axum endpoint, heartbeat and idle cleanup

pub mod broadcaster;
pub mod connection;
pub mod events;
pub mod handlers;
pub mod messages;
pub mod server;
pub mod session;

use std::sync::Arc;

use crate::config::WebSocketSettings;

pub use broadcaster::EventBroadcaster;
pub use connection::{ConnectionManager, ConnectionStats};
pub use events::EventStats;
pub use handlers::EventHandlers;
pub use messages::{ClientMessage, Event, EventType, ServerMessage, SubscriptionFilters};
pub use server::{cleanup_task, websocket_handler};
pub use session::Session;

/// WebSocket state shared across connections
pub struct WebSocketState {
    pub settings: WebSocketSettings,
    pub connections: Arc<ConnectionManager>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub handlers: EventHandlers,
}

impl WebSocketState {
    pub fn new(settings: WebSocketSettings) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let broadcaster = Arc::new(EventBroadcaster::new(
            connections.clone(),
            settings.broadcast_capacity,
        ));
        let handlers = EventHandlers::new(broadcaster.clone());

        Self {
            settings,
            connections,
            broadcaster,
            handlers,
        }
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.connections.stats()
    }

    pub fn event_stats(&self) -> EventStats {
        self.broadcaster.stats()
    }
}
