//! Event broadcasting
//!
//! Publishes knowledge events to WebSocket connections and to any internal
//! consumers subscribed to the broadcast channel.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    connection::ConnectionManager,
    events::{EventEnvelope, EventPriority, EventStats},
    messages::Event,
};
use crate::metrics::EVENTS_BROADCAST_TOTAL;

/// Event broadcaster
pub struct EventBroadcaster {
    tx: broadcast::Sender<EventEnvelope>,
    connections: Arc<ConnectionManager>,
    stats: Arc<RwLock<EventStats>>,
}

impl EventBroadcaster {
    pub fn new(connections: Arc<ConnectionManager>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            connections,
            stats: Arc::new(RwLock::new(EventStats::default())),
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: Event) -> EventEnvelope {
        let event_type = event.event_type();
        let envelope = EventEnvelope::new(event);

        if envelope.priority >= EventPriority::High {
            info!(
                event_type = %event_type,
                incident_id = %envelope.event.incident_id(),
                priority = ?envelope.priority,
                "Publishing event"
            );
        } else {
            debug!(
                event_type = %event_type,
                incident_id = %envelope.event.incident_id(),
                "Publishing event"
            );
        }

        self.stats.write().record_event(event_type);
        let label = event_type.to_string();
        EVENTS_BROADCAST_TOTAL
            .with_label_values(&[label.as_str()])
            .inc();

        // No internal receivers is the normal case
        let _ = self.tx.send(envelope.clone());

        self.connections.broadcast_event(&envelope);
        envelope
    }

    /// Subscribe to events (for internal consumers)
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::websocket::messages::{test_support::incident, EventType};

    #[tokio::test]
    async fn test_publish_reaches_internal_subscribers() {
        let broadcaster = EventBroadcaster::new(Arc::new(ConnectionManager::new()), 16);
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        let incident = incident(Severity::Medium);
        broadcaster.publish(Event::IncidentCreated {
            incident: incident.clone(),
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.event_type(), EventType::IncidentCreated);
        assert_eq!(envelope.event.incident_id(), incident.id);
        assert_eq!(broadcaster.stats().total_events, 1);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = EventBroadcaster::new(Arc::new(ConnectionManager::new()), 16);
        let envelope = broadcaster.publish(Event::IncidentDeleted {
            incident: incident(Severity::Low),
        });
        assert!(!envelope.id.is_empty());
        assert_eq!(broadcaster.stats().events_by_type["incident_deleted"], 1);
    }
}
