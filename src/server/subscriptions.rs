//! Resource subscription manager
//!
//! Maps URIs (or URI patterns) to the sessions that subscribed. External
//! `resource.changed` events fan out to each subscribed session as a
//! scope-wide `notifications/resources/list_changed` plus a per-URI
//! `notifications/resources/updated`; both pass through the session's
//! post-init notification gate before hitting the wire.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// URI → subscriber-set index shared across sessions
#[derive(Default)]
pub struct SubscriptionManager {
    subscribers: Mutex<HashMap<String, HashSet<String>>>,
}

impl SubscriptionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a session to a URI; idempotent
    pub fn subscribe(&self, session_id: &str, uri: &str) {
        self.subscribers
            .lock()
            .expect("subscription map poisoned")
            .entry(uri.to_string())
            .or_default()
            .insert(session_id.to_string());
    }

    /// Unsubscribe a session from a URI; idempotent
    pub fn unsubscribe(&self, session_id: &str, uri: &str) {
        let mut map = self.subscribers.lock().expect("subscription map poisoned");
        if let Some(set) = map.get_mut(uri) {
            set.remove(session_id);
            if set.is_empty() {
                map.remove(uri);
            }
        }
    }

    /// Sessions subscribed to exactly this URI
    pub fn sessions_for(&self, uri: &str) -> Vec<String> {
        self.subscribers
            .lock()
            .expect("subscription map poisoned")
            .get(uri)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all subscriptions held by one session (session close)
    pub fn remove_session(&self, session_id: &str) {
        let mut map = self.subscribers.lock().expect("subscription map poisoned");
        map.retain(|_, set| {
            set.remove(session_id);
            !set.is_empty()
        });
    }

    /// Total number of subscribed URIs
    pub fn uri_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscription map poisoned")
            .len()
    }
}
