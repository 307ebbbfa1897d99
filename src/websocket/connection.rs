//! WebSocket connection management
//!
//! Registry of active connections plus filtered fanout of events.

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{stream::SplitSink, SinkExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    events::EventEnvelope,
    messages::{Event, ServerMessage},
    session::Session,
};
use crate::metrics::{WEBSOCKET_CONNECTIONS_ACTIVE, WEBSOCKET_MESSAGES_TOTAL};

/// Connection handle for sending messages
pub struct Connection {
    pub session: Arc<RwLock<Session>>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    remote_addr: Option<String>,
}

impl Connection {
    pub fn new(
        session: Session,
        remote_addr: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session: Arc::new(RwLock::new(session)),
                tx,
                remote_addr,
            },
            rx,
        )
    }

    /// Queue a message for this connection's writer task
    pub fn send(&self, message: ServerMessage) -> Result<(), ConnectionError> {
        self.tx
            .send(message)
            .map_err(|_| ConnectionError::SendFailed)
    }

    pub fn session_id(&self) -> String {
        self.session.read().id.clone()
    }

    /// True when at least one subscription accepts the event
    pub fn should_receive_event(&self, event: &Event) -> bool {
        self.session
            .read()
            .subscriptions
            .values()
            .any(|sub| sub.filters.matches(event))
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }
}

/// Connection manager
pub struct ConnectionManager {
    /// Active connections indexed by session ID
    connections: Arc<DashMap<String, Arc<Connection>>>,
    stats: Arc<RwLock<ConnectionStats>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            stats: Arc::new(RwLock::new(ConnectionStats::default())),
        }
    }

    /// Register a new connection
    pub fn register(
        &self,
        session: Session,
        remote_addr: Option<String>,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerMessage>) {
        let session_id = session.id.clone();
        let (connection, rx) = Connection::new(session, remote_addr);
        let connection = Arc::new(connection);

        self.connections.insert(session_id.clone(), connection.clone());
        {
            let mut stats = self.stats.write();
            stats.total_connections += 1;
            stats.active_connections = self.connections.len() as u64;
        }
        WEBSOCKET_CONNECTIONS_ACTIVE.set(self.connections.len() as f64);

        info!(session_id = %session_id, "WebSocket connection registered");
        (connection, rx)
    }

    /// Unregister a connection
    pub fn unregister(&self, session_id: &str) {
        if self.connections.remove(session_id).is_some() {
            self.stats.write().active_connections = self.connections.len() as u64;
            WEBSOCKET_CONNECTIONS_ACTIVE.set(self.connections.len() as f64);
            info!(session_id = %session_id, "WebSocket connection unregistered");
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(session_id).map(|e| e.value().clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Deliver an event to every connection with a matching subscription
    pub fn broadcast_event(&self, envelope: &EventEnvelope) -> u64 {
        let event_type = envelope.event.event_type();
        let mut delivered = 0u64;
        let mut filtered = 0u64;

        // Collect first so no DashMap shard lock is held while sending
        let connections: Vec<Arc<Connection>> =
            self.connections.iter().map(|e| e.value().clone()).collect();

        for connection in connections {
            if !connection.should_receive_event(&envelope.event) {
                filtered += 1;
                continue;
            }

            let message = ServerMessage::Event {
                message_id: envelope.id.clone(),
                event: envelope.event.clone(),
                timestamp: envelope.timestamp,
            };

            match connection.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    session_id = %connection.session_id(),
                    error = %e,
                    "Failed to send event to connection"
                ),
            }
        }

        debug!(
            event_type = %event_type,
            delivered = delivered,
            filtered = filtered,
            "Event broadcast completed"
        );

        let mut stats = self.stats.write();
        stats.total_events_broadcast += 1;
        stats.total_events_delivered += delivered;
        delivered
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Drop sessions idle longer than `timeout_secs`, returning how many were removed
    pub fn cleanup_expired(&self, timeout_secs: i64) -> usize {
        let expired: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().session.read().is_expired(timeout_secs))
            .map(|entry| entry.key().clone())
            .collect();

        for session_id in &expired {
            info!(session_id = %session_id, "Cleaning up expired session");
            self.unregister(session_id);
        }
        expired.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_events_broadcast: u64,
    pub total_events_delivered: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to send message to connection")]
    SendFailed,
}

/// Serializes server messages onto the socket sink
pub struct MessageWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl MessageWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }

    pub async fn send(&mut self, message: ServerMessage) -> Result<(), std::io::Error> {
        let json = serde_json::to_string(&message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))?;
        WEBSOCKET_MESSAGES_TOTAL.with_label_values(&["outbound"]).inc();
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), std::io::Error> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::websocket::messages::{test_support::incident, SubscriptionFilters};

    #[test]
    fn test_connection_registration() {
        let manager = ConnectionManager::new();
        let session = Session::new();
        let session_id = session.id.clone();

        let (conn, _rx) = manager.register(session, Some("127.0.0.1:8080".to_string()));
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(conn.remote_addr(), Some("127.0.0.1:8080"));
        assert!(manager.get(&session_id).is_some());

        manager.unregister(&session_id);
        assert_eq!(manager.connection_count(), 0);
        assert!(manager.get(&session_id).is_none());

        let stats = manager.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.active_connections, 0);
    }

    #[test]
    fn test_unsubscribed_connection_receives_nothing() {
        let (conn, _rx) = Connection::new(Session::new(), None);
        let event = Event::IncidentCreated {
            incident: incident(Severity::High),
        };
        assert!(!conn.should_receive_event(&event));

        conn.session
            .write()
            .subscribe("all".to_string(), SubscriptionFilters::default());
        assert!(conn.should_receive_event(&event));
    }

    #[tokio::test]
    async fn test_broadcast_honors_filters() {
        let manager = ConnectionManager::new();

        let (critical_only, mut critical_rx) = manager.register(Session::new(), None);
        critical_only.session.write().subscribe(
            "crit".to_string(),
            SubscriptionFilters {
                severities: vec![Severity::Critical],
                ..Default::default()
            },
        );

        let (everything, mut all_rx) = manager.register(Session::new(), None);
        everything
            .session
            .write()
            .subscribe("all".to_string(), SubscriptionFilters::default());

        let envelope = EventEnvelope::new(Event::IncidentCreated {
            incident: incident(Severity::Low),
        });
        assert_eq!(manager.broadcast_event(&envelope), 1);

        match all_rx.recv().await.unwrap() {
            ServerMessage::Event { message_id, .. } => assert_eq!(message_id, envelope.id),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(critical_rx.try_recv().is_err());
        assert_eq!(manager.stats().total_events_delivered, 1);
    }

    #[test]
    fn test_cleanup_expired() {
        let manager = ConnectionManager::new();
        let mut stale = Session::new();
        stale.last_active = chrono::Utc::now() - chrono::Duration::seconds(600);
        let (_a, _rx_a) = manager.register(stale, None);
        let (_b, _rx_b) = manager.register(Session::new(), None);

        assert_eq!(manager.cleanup_expired(300), 1);
        assert_eq!(manager.connection_count(), 1);
    }
}
