//! Cancellation fabric
//!
//! Every in-flight inbound request installs a cancellation token keyed by its
//! request id. An inbound `notifications/cancelled` resolves the token, which
//! fans out to the handler through its [`crate::core::RequestContext`].
//! Cancellations for requests that already completed are ignored silently.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::messages::CancelledParams;
use crate::protocol::types::RequestId;

/// Tracks cancellation tokens for in-flight requests
#[derive(Default)]
pub struct CancellationFabric {
    inflight: Mutex<HashMap<String, CancellationToken>>,
}

fn key(id: &RequestId) -> String {
    match id {
        Value::String(s) => format!("s:{s}"),
        other => format!("n:{other}"),
    }
}

impl CancellationFabric {
    /// Create an empty fabric
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a token for a request about to be dispatched
    pub fn install(&self, id: &RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.inflight
            .lock()
            .expect("inflight map poisoned")
            .insert(key(id), token.clone());
        token
    }

    /// Remove the token once the handler returned
    pub fn complete(&self, id: &RequestId) {
        self.inflight
            .lock()
            .expect("inflight map poisoned")
            .remove(&key(id));
    }

    /// Resolve an inbound `notifications/cancelled`. Unknown ids (handler
    /// already returned) are ignored silently.
    pub fn cancel(&self, params: &CancelledParams) {
        let token = self
            .inflight
            .lock()
            .expect("inflight map poisoned")
            .remove(&key(&params.request_id));
        match token {
            Some(token) => {
                debug!(request_id = %params.request_id, reason = params.reason.as_deref().unwrap_or(""), "request cancelled");
                token.cancel();
            }
            None => {
                debug!(request_id = %params.request_id, "cancellation for completed request ignored");
            }
        }
    }

    /// Cancel everything still in flight (session shutdown)
    pub fn cancel_all(&self) {
        let mut inflight = self.inflight.lock().expect("inflight map poisoned");
        for (_, token) in inflight.drain() {
            token.cancel();
        }
    }

    /// Number of requests currently tracked
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().expect("inflight map poisoned").len()
    }
}
