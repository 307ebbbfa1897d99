//! WebSocket session management
//!
//! Session lifecycle and subscription tracking.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use super::messages::SubscriptionFilters;

/// WebSocket session
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Active subscriptions keyed by client-chosen id
    pub subscriptions: HashMap<String, Subscription>,
    pub message_count: u64,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_active: now,
            subscriptions: HashMap::new(),
            message_count: 0,
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
        self.message_count += 1;
    }

    /// Check if session has been idle longer than `timeout_secs`
    pub fn is_expired(&self, timeout_secs: i64) -> bool {
        (Utc::now() - self.last_active).num_seconds() > timeout_secs
    }

    /// Add or replace a subscription
    pub fn subscribe(&mut self, subscription_id: String, filters: SubscriptionFilters) {
        self.subscriptions.insert(
            subscription_id.clone(),
            Subscription {
                id: subscription_id,
                filters,
                created_at: Utc::now(),
            },
        );
        self.touch();
    }

    /// Remove a subscription, returning whether it existed
    pub fn unsubscribe(&mut self, subscription_id: &str) -> bool {
        self.touch();
        self.subscriptions.remove(subscription_id).is_some()
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription to a filtered slice of events
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub filters: SubscriptionFilters,
    pub created_at: DateTime<Utc>,
}
