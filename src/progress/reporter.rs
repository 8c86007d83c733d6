//! Progress reporters
//!
//! A reporter wraps one progress token with convenience operations for
//! handler code. The hot read path (`current()`) is lock-free via a scaled
//! atomic; `total`, `message`, timestamps, and children live behind a mutex.
//!
//! Hierarchy note: children report through their own tokens and are NOT
//! rolled up into the parent automatically. Automatic rollup would require
//! taking the parent's lock from the child's update path, which deadlocks
//! when the parent is mid-update; callers that want aggregate progress update
//! the parent explicitly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::json;
use tracing::warn;

use crate::core::error::{McpError, McpResult, ProgressError};
use crate::progress::rate_limit::{Admission, ProgressRateLimiter, RateLimiterConfig};
use crate::progress::token::ProgressTokenManager;
use crate::protocol::messages::ProgressParams;
use crate::protocol::types::RequestId;

/// Scale factor for the lock-free current value (3 decimal places)
const SCALE: f64 = 1000.0;

/// Destination for admitted progress notifications.
///
/// The engine wires this to the session writer, where projection and the
/// post-init gate apply.
pub trait ProgressSink: Send + Sync {
    /// Emit one canonical progress notification
    fn send(&self, params: ProgressParams) -> McpResult<()>;
}

/// Sink that discards notifications; useful in tests and detached reporters
pub struct NullSink;

impl ProgressSink for NullSink {
    fn send(&self, _params: ProgressParams) -> McpResult<()> {
        Ok(())
    }
}

struct ChildRecord {
    token: String,
    weight: f64,
}

struct ReporterInner {
    total: Option<f64>,
    message: Option<String>,
    started_at: Instant,
    updated_at: Instant,
    children: Vec<ChildRecord>,
}

/// Reporter for one progress token
pub struct ProgressReporter {
    token: String,
    request_id: RequestId,
    scaled_current: AtomicU64,
    active: AtomicBool,
    completed: AtomicBool,
    inner: Mutex<ReporterInner>,
    limiter: ProgressRateLimiter,
    limiter_config: RateLimiterConfig,
    manager: Arc<ProgressTokenManager>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    /// Create a reporter around an already-registered token
    pub fn new(
        token: String,
        request_id: RequestId,
        total: Option<f64>,
        manager: Arc<ProgressTokenManager>,
        limiter_config: RateLimiterConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            token,
            request_id,
            scaled_current: AtomicU64::new(0),
            active: AtomicBool::new(true),
            completed: AtomicBool::new(false),
            inner: Mutex::new(ReporterInner {
                total,
                message: None,
                started_at: now,
                updated_at: now,
                children: Vec::new(),
            }),
            limiter: ProgressRateLimiter::new(limiter_config.clone()),
            limiter_config,
            manager,
            sink,
        })
    }

    /// The token this reporter feeds
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The request this reporter belongs to
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Lock-free read of the current progress value
    pub fn current(&self) -> f64 {
        self.scaled_current.load(Ordering::Acquire) as f64 / SCALE
    }

    /// Whether updates are still accepted
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether `complete` has run
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Elapsed time since the reporter was created
    pub fn elapsed(&self) -> std::time::Duration {
        self.inner.lock().expect("reporter inner poisoned").started_at.elapsed()
    }

    /// Update progress to `value`, optionally replacing the status message.
    pub fn update(&self, value: f64, message: Option<&str>) -> McpResult<()> {
        if !self.is_active() {
            return Err(ProgressError::ReporterInactive.into());
        }
        if value < 0.0 {
            return Err(ProgressError::NegativeValue(value).into());
        }

        let total = {
            let inner = self.inner.lock().expect("reporter inner poisoned");
            if let Some(total) = inner.total {
                if value > total {
                    return Err(ProgressError::ProgressOverrunsTotal {
                        progress: value,
                        total,
                    }
                    .into());
                }
            }
            inner.total
        };

        // The manager is the monotonicity referee; a decrease fails here and
        // leaves every piece of state untouched.
        self.manager.update_with_progress(&self.token, value)?;

        self.scaled_current
            .store((value * SCALE) as u64, Ordering::Release);
        {
            let mut inner = self.inner.lock().expect("reporter inner poisoned");
            inner.updated_at = Instant::now();
            if let Some(msg) = message {
                inner.message = Some(msg.to_string());
            }
        }

        self.emit(ProgressParams {
            progress_token: json!(self.token.clone()),
            progress: value,
            total,
            message: message.map(String::from),
        });
        Ok(())
    }

    /// Advance progress by `delta`
    pub fn increment(&self, delta: f64, message: Option<&str>) -> McpResult<()> {
        if delta < 0.0 {
            return Err(ProgressError::NegativeValue(delta).into());
        }
        self.update(self.current() + delta, message)
    }

    /// Set (or replace) the expected total
    pub fn set_total(&self, total: f64) -> McpResult<()> {
        if !self.is_active() {
            return Err(ProgressError::ReporterInactive.into());
        }
        if total < 0.0 {
            return Err(ProgressError::NegativeValue(total).into());
        }
        let current = self.current();
        if total < current {
            return Err(ProgressError::ProgressOverrunsTotal {
                progress: current,
                total,
            }
            .into());
        }
        self.inner.lock().expect("reporter inner poisoned").total = Some(total);
        Ok(())
    }

    /// Emit the terminal notification (`current ← total`) and deactivate.
    ///
    /// The token deactivates even when the terminal send fails; internal
    /// state is never reverted on send failure.
    pub fn complete(&self, message: Option<&str>) -> McpResult<()> {
        if !self.is_active() {
            return Err(ProgressError::ReporterInactive.into());
        }
        let total = self.inner.lock().expect("reporter inner poisoned").total;
        let final_value = total.unwrap_or(100.0).max(self.current());

        let result = self.manager.update_with_progress(&self.token, final_value);
        if result.is_ok() {
            self.scaled_current
                .store((final_value * SCALE) as u64, Ordering::Release);
            // Terminal notification goes straight to the sink; the token is
            // done and nothing further will drain the buffer.
            if let Err(e) = self.sink.send(ProgressParams {
                progress_token: json!(self.token.clone()),
                progress: final_value,
                total,
                message: message.map(String::from),
            }) {
                warn!(token = %self.token, error = %e, "terminal progress notification failed");
            }
        }

        self.deactivate();
        result
    }

    /// Deactivate without a terminal notification
    pub fn cancel(&self, message: Option<&str>) {
        if let Some(msg) = message {
            self.inner.lock().expect("reporter inner poisoned").message = Some(msg.to_string());
        }
        self.deactivate();
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.completed.store(true, Ordering::Release);
        self.manager.deactivate(&self.token);
    }

    /// Create a child reporter with its own token.
    ///
    /// `weight` must be in (0, 1]; it is recorded for callers that aggregate
    /// child progress into the parent themselves. The child never updates the
    /// parent.
    pub fn create_child(
        &self,
        request_id: RequestId,
        weight: f64,
        total: Option<f64>,
    ) -> McpResult<Arc<ProgressReporter>> {
        if !self.is_active() {
            return Err(ProgressError::ReporterInactive.into());
        }
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(McpError::Validation(format!(
                "child weight must be in (0, 1], got {weight}"
            )));
        }
        let version = self
            .manager
            .get(&self.token)
            .map(|s| s.protocol_version)
            .unwrap_or(crate::protocol::version::ProtocolVersion::Draft);
        let child_token = self.manager.generate(request_id.clone(), version);
        {
            let mut inner = self.inner.lock().expect("reporter inner poisoned");
            inner.children.push(ChildRecord {
                token: child_token.clone(),
                weight,
            });
        }
        Ok(ProgressReporter::new(
            child_token,
            request_id,
            total,
            self.manager.clone(),
            self.limiter_config.clone(),
            self.sink.clone(),
        ))
    }

    /// Tokens and weights of the children created so far
    pub fn children(&self) -> Vec<(String, f64)> {
        self.inner
            .lock()
            .expect("reporter inner poisoned")
            .children
            .iter()
            .map(|c| (c.token.clone(), c.weight))
            .collect()
    }

    /// Rate limiter statistics for this reporter's token
    pub fn rate_limit_statistics(&self) -> crate::progress::rate_limit::RateLimitStatistics {
        self.limiter.statistics()
    }

    fn emit(&self, params: ProgressParams) {
        match self.limiter.try_admit(params) {
            Ok(Admission::Send(n)) => {
                if let Err(e) = self.sink.send(n) {
                    warn!(token = %self.token, error = %e, "progress notification failed");
                }
                for n in self.limiter.process_buffer() {
                    if let Err(e) = self.sink.send(n) {
                        warn!(token = %self.token, error = %e, "buffered progress notification failed");
                    }
                }
            }
            Ok(Admission::Buffered | Admission::Combined) => {}
            Err(e) => {
                warn!(token = %self.token, error = %e, "progress notification dropped by limiter");
            }
        }
    }
}
