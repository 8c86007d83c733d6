//! Progress token lifecycle
//!
//! Tokens correlate `notifications/progress` to a long-running request. The
//! manager referees every token by id and enforces the strictly
//! non-decreasing invariant centrally: a decrease is a soft error, the token
//! state stays untouched, and no wire notification is produced.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::error::{McpResult, ProgressError};
use crate::protocol::types::RequestId;
use crate::protocol::version::ProtocolVersion;

/// Prefix discriminating library-minted tokens from peer-supplied ones
const TOKEN_PREFIX: &str = "progress-";

/// State tracked per progress token
#[derive(Debug, Clone)]
pub struct ProgressTokenState {
    /// The opaque token string
    pub token: String,
    /// Request the token correlates to
    pub request_id: RequestId,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Monotonic instant of the last admitted update (drives idle cleanup)
    pub last_update_at: Instant,
    /// Last admitted progress; −1 until the first update so any non-negative
    /// value is accepted
    pub last_progress: f64,
    /// Whether updates are still accepted
    pub active: bool,
    /// Revision of the session the token belongs to
    pub protocol_version: ProtocolVersion,
}

/// Referee for all progress tokens in the process
pub struct ProgressTokenManager {
    tokens: Mutex<HashMap<String, ProgressTokenState>>,
    fallback_counter: AtomicU64,
}

impl Default for ProgressTokenManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTokenManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            fallback_counter: AtomicU64::new(0),
        }
    }

    /// Mint a new token for `request_id` and register it.
    ///
    /// Tokens are random (uuid v4) behind a discriminator prefix.
    pub fn generate(&self, request_id: RequestId, version: ProtocolVersion) -> String {
        let token = format!("{TOKEN_PREFIX}{}", Uuid::new_v4());
        self.register(token.clone(), request_id, version);
        token
    }

    /// Time+counter composite used when random generation is unavailable
    pub fn composite_token(&self, request_id: &RequestId) -> String {
        let seq = self.fallback_counter.fetch_add(1, Ordering::Relaxed);
        let id_part = match request_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!(
            "{TOKEN_PREFIX}{}-{id_part}-{seq}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }

    /// Register an externally supplied token (from `params._meta`)
    pub fn register(&self, token: String, request_id: RequestId, version: ProtocolVersion) {
        let mut tokens = self.tokens.lock().expect("token map poisoned");
        tokens.insert(
            token.clone(),
            ProgressTokenState {
                token,
                request_id,
                created_at: Utc::now(),
                last_update_at: Instant::now(),
                last_progress: -1.0,
                active: true,
                protocol_version: version,
            },
        );
    }

    /// Whether the token exists and is active
    pub fn validate(&self, token: &str) -> bool {
        self.tokens
            .lock()
            .expect("token map poisoned")
            .get(token)
            .is_some_and(|t| t.active)
    }

    /// Snapshot the state of one token
    pub fn get(&self, token: &str) -> Option<ProgressTokenState> {
        self.tokens
            .lock()
            .expect("token map poisoned")
            .get(token)
            .cloned()
    }

    /// Record an admitted update, enforcing strict non-decrease.
    ///
    /// On failure the token state is unchanged and the caller must not emit a
    /// wire notification.
    pub fn update_with_progress(&self, token: &str, progress: f64) -> McpResult<()> {
        let mut tokens = self.tokens.lock().expect("token map poisoned");
        let state = tokens
            .get_mut(token)
            .ok_or_else(|| ProgressError::UnknownToken(token.to_string()))?;
        if !state.active {
            return Err(ProgressError::ReporterInactive.into());
        }
        if progress < 0.0 {
            return Err(ProgressError::NegativeValue(progress).into());
        }
        if progress < state.last_progress {
            return Err(ProgressError::ProgressDecreased {
                last: state.last_progress,
                attempted: progress,
            }
            .into());
        }
        state.last_progress = progress;
        state.last_update_at = Instant::now();
        Ok(())
    }

    /// Stop accepting updates on the token
    pub fn deactivate(&self, token: &str) {
        let mut tokens = self.tokens.lock().expect("token map poisoned");
        if let Some(state) = tokens.get_mut(token) {
            state.active = false;
        }
    }

    /// Drop tokens idle for at least `idle_threshold`, returning the count
    pub fn cleanup_expired(&self, idle_threshold: Duration) -> usize {
        let mut tokens = self.tokens.lock().expect("token map poisoned");
        let before = tokens.len();
        tokens.retain(|_, state| state.last_update_at.elapsed() < idle_threshold);
        before - tokens.len()
    }

    /// Number of tracked tokens
    pub fn len(&self) -> usize {
        self.tokens.lock().expect("token map poisoned").len()
    }

    /// Whether no tokens are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
