//! Progress notification rate limiting
//!
//! One limiter guards one token. A one-second sliding window counts
//! notifications admitted to the wire; excess updates land in a bounded FIFO
//! whose overflow behavior is configurable. `process_buffer` drains the FIFO
//! opportunistically, up to the remaining second-budget.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::ProgressParams;

/// What to do when the pending buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStrategy {
    /// Evict the FIFO head to make room
    DropOldest,
    /// Reject the incoming notification
    DropNewest,
    /// Merge into the most recent buffered entry for the same token, keeping
    /// the newest (monotonically larger) values; falls back to DropOldest
    /// when no mergeable entry exists
    Combine,
    /// Behaves as DropOldest: publish paths are synchronous, so the caller
    /// cannot actually block here
    BlockUntilSpace,
}

/// Limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Notifications admitted to the wire per second
    pub max_per_sec: u32,
    /// Capacity of the pending FIFO
    pub buffer_size: usize,
    /// Overflow behavior when the FIFO is full
    pub overflow_strategy: OverflowStrategy,
    /// Minimum buffered entries before Combine starts merging
    pub combine_threshold: usize,
    /// Whether `process_buffer` drains in batches
    pub enable_batching: bool,
    /// Maximum entries drained per `process_buffer` call when batching
    pub batch_size: usize,
    /// Age after which a partial batch is flushed regardless of size
    pub batch_timeout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_per_sec: 10,
            buffer_size: 64,
            overflow_strategy: OverflowStrategy::Combine,
            combine_threshold: 0,
            enable_batching: false,
            batch_size: 8,
            batch_timeout: Duration::from_millis(250),
        }
    }
}

/// Counters exposed for `GetProgressRateLimitStatistics`-style queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitStatistics {
    /// Total notifications offered to the limiter
    pub admitted: u64,
    /// Sent to the wire (directly or via buffer drain)
    pub sent: u64,
    /// Dropped by overflow handling
    pub dropped: u64,
    /// Merged into an existing buffered entry
    pub combined: u64,
    /// Currently waiting in the FIFO
    pub buffered: usize,
}

/// Outcome of offering one notification to the limiter
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Send now
    Send(ProgressParams),
    /// Queued for a later `process_buffer` drain
    Buffered,
    /// Merged into an already-buffered entry
    Combined,
}

struct LimiterState {
    window_start: Instant,
    window_count: u32,
    buffer: VecDeque<ProgressParams>,
    last_drain: Instant,
    sent: u64,
    dropped: u64,
    combined: u64,
    admitted: u64,
}

/// Per-token sliding-window rate limiter
pub struct ProgressRateLimiter {
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
}

impl ProgressRateLimiter {
    /// Create a limiter with the given configuration
    pub fn new(config: RateLimiterConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            state: Mutex::new(LimiterState {
                window_start: now,
                window_count: 0,
                buffer: VecDeque::new(),
                last_drain: now,
                sent: 0,
                dropped: 0,
                combined: 0,
                admitted: 0,
            }),
        }
    }

    /// Offer a notification. Returns how it was disposed of; `DropNewest`
    /// overflow is the one case that surfaces as an error.
    pub fn try_admit(&self, notification: ProgressParams) -> McpResult<Admission> {
        let mut state = self.state.lock().expect("limiter state poisoned");
        state.admitted += 1;
        self.roll_window(&mut state);

        if state.window_count < self.config.max_per_sec {
            state.window_count += 1;
            state.sent += 1;
            return Ok(Admission::Send(notification));
        }

        self.buffer_notification(&mut state, notification)
    }

    fn buffer_notification(
        &self,
        state: &mut LimiterState,
        notification: ProgressParams,
    ) -> McpResult<Admission> {
        if state.buffer.len() < self.config.buffer_size {
            state.buffer.push_back(notification);
            return Ok(Admission::Buffered);
        }

        match self.config.overflow_strategy {
            OverflowStrategy::DropNewest => {
                state.dropped += 1;
                Err(McpError::bus(
                    "progress buffer full, newest notification dropped".to_string(),
                ))
            }
            OverflowStrategy::Combine if state.buffer.len() >= self.config.combine_threshold => {
                let token = notification.progress_token.clone();
                let slot = state
                    .buffer
                    .iter_mut()
                    .rev()
                    .find(|buffered| buffered.progress_token == token);
                match slot {
                    Some(buffered) => {
                        // Keep the latest values; monotonicity holds because
                        // the incoming update already passed the token check.
                        buffered.progress = notification.progress;
                        if notification.total.is_some() {
                            buffered.total = notification.total;
                        }
                        if notification
                            .message
                            .as_ref()
                            .is_some_and(|m| !m.is_empty())
                        {
                            buffered.message = notification.message;
                        }
                        state.combined += 1;
                        Ok(Admission::Combined)
                    }
                    None => {
                        self.evict_oldest(state);
                        state.buffer.push_back(notification);
                        Ok(Admission::Buffered)
                    }
                }
            }
            // Combine below threshold, DropOldest, and BlockUntilSpace all
            // evict the FIFO head.
            _ => {
                self.evict_oldest(state);
                state.buffer.push_back(notification);
                Ok(Admission::Buffered)
            }
        }
    }

    fn evict_oldest(&self, state: &mut LimiterState) {
        if state.buffer.pop_front().is_some() {
            state.dropped += 1;
        }
    }

    fn roll_window(&self, state: &mut LimiterState) {
        if state.window_start.elapsed() >= Duration::from_secs(1) {
            state.window_start = Instant::now();
            state.window_count = 0;
        }
    }

    /// Drain buffered notifications up to the remaining second-budget.
    ///
    /// Called opportunistically, typically after each successful send. With
    /// batching enabled at most `batch_size` entries are drained per call
    /// unless the buffer has waited past `batch_timeout`.
    pub fn process_buffer(&self) -> Vec<ProgressParams> {
        let mut state = self.state.lock().expect("limiter state poisoned");
        self.roll_window(&mut state);

        let budget = self.config.max_per_sec.saturating_sub(state.window_count) as usize;
        let mut cap = budget;
        if self.config.enable_batching
            && state.last_drain.elapsed() < self.config.batch_timeout
        {
            cap = cap.min(self.config.batch_size);
        }

        let mut drained = Vec::new();
        while drained.len() < cap {
            match state.buffer.pop_front() {
                Some(n) => drained.push(n),
                None => break,
            }
        }
        state.window_count += drained.len() as u32;
        state.sent += drained.len() as u64;
        if !drained.is_empty() {
            state.last_drain = Instant::now();
        }
        drained
    }

    /// Current counters
    pub fn statistics(&self) -> RateLimitStatistics {
        let state = self.state.lock().expect("limiter state poisoned");
        RateLimitStatistics {
            admitted: state.admitted,
            sent: state.sent,
            dropped: state.dropped,
            combined: state.combined,
            buffered: state.buffer.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(token: &str, progress: f64) -> ProgressParams {
        ProgressParams {
            progress_token: json!(token),
            progress,
            total: Some(100.0),
            message: None,
        }
    }

    fn limiter(max_per_sec: u32, buffer_size: usize, strategy: OverflowStrategy) -> ProgressRateLimiter {
        ProgressRateLimiter::new(RateLimiterConfig {
            max_per_sec,
            buffer_size,
            overflow_strategy: strategy,
            ..RateLimiterConfig::default()
        })
    }

    #[test]
    fn test_admits_up_to_window_budget() {
        let l = limiter(2, 8, OverflowStrategy::DropOldest);
        assert!(matches!(
            l.try_admit(notification("t", 1.0)).unwrap(),
            Admission::Send(_)
        ));
        assert!(matches!(
            l.try_admit(notification("t", 2.0)).unwrap(),
            Admission::Send(_)
        ));
        assert!(matches!(
            l.try_admit(notification("t", 3.0)).unwrap(),
            Admission::Buffered
        ));
        assert_eq!(l.statistics().buffered, 1);
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let l = limiter(1, 2, OverflowStrategy::DropOldest);
        l.try_admit(notification("t", 1.0)).unwrap(); // sent
        l.try_admit(notification("t", 2.0)).unwrap(); // buffered
        l.try_admit(notification("t", 3.0)).unwrap(); // buffered
        l.try_admit(notification("t", 4.0)).unwrap(); // evicts 2.0
        let stats = l.statistics();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.buffered, 2);
    }

    #[test]
    fn test_drop_newest_errors() {
        let l = limiter(1, 1, OverflowStrategy::DropNewest);
        l.try_admit(notification("t", 1.0)).unwrap();
        l.try_admit(notification("t", 2.0)).unwrap();
        let err = l.try_admit(notification("t", 3.0)).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(l.statistics().dropped, 1);
        assert_eq!(l.statistics().buffered, 1);
    }

    #[test]
    fn test_combine_merges_same_token() {
        let l = limiter(1, 1, OverflowStrategy::Combine);
        l.try_admit(notification("t", 1.0)).unwrap(); // sent
        l.try_admit(notification("t", 2.0)).unwrap(); // buffered
        let admission = l.try_admit(notification("t", 3.0)).unwrap();
        assert_eq!(admission, Admission::Combined);
        let stats = l.statistics();
        assert_eq!(stats.combined, 1);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.buffered, 1);

        // The buffered entry now carries the merged (latest) progress.
        std::thread::sleep(Duration::from_millis(1100));
        let drained = l.process_buffer();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].progress, 3.0);
    }

    #[test]
    fn test_combine_falls_back_to_drop_oldest_for_foreign_token() {
        let l = limiter(1, 1, OverflowStrategy::Combine);
        l.try_admit(notification("a", 1.0)).unwrap(); // sent
        l.try_admit(notification("a", 2.0)).unwrap(); // buffered
        let admission = l.try_admit(notification("b", 1.0)).unwrap();
        assert_eq!(admission, Admission::Buffered);
        assert_eq!(l.statistics().dropped, 1);
    }

    #[test]
    fn test_block_until_space_degenerates_to_drop_oldest() {
        let l = limiter(1, 1, OverflowStrategy::BlockUntilSpace);
        l.try_admit(notification("t", 1.0)).unwrap();
        l.try_admit(notification("t", 2.0)).unwrap();
        l.try_admit(notification("t", 3.0)).unwrap();
        assert_eq!(l.statistics().dropped, 1);
    }

    #[test]
    fn test_statistics_balance() {
        // combined + sent + dropped + buffered == admitted
        let l = limiter(2, 2, OverflowStrategy::Combine);
        for i in 0..10 {
            let _ = l.try_admit(notification("t", i as f64));
        }
        let s = l.statistics();
        assert_eq!(
            s.combined + s.sent + s.dropped + s.buffered as u64,
            s.admitted
        );
        assert_eq!(s.admitted, 10);
    }

    #[test]
    fn test_process_buffer_respects_budget() {
        let l = limiter(2, 8, OverflowStrategy::DropOldest);
        l.try_admit(notification("t", 1.0)).unwrap();
        l.try_admit(notification("t", 2.0)).unwrap();
        for i in 3..7 {
            l.try_admit(notification("t", i as f64)).unwrap();
        }
        // Window exhausted: nothing drains yet.
        assert!(l.process_buffer().is_empty());
        std::thread::sleep(Duration::from_millis(1100));
        let drained = l.process_buffer();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].progress, 3.0);
        assert_eq!(drained[1].progress, 4.0);
    }
}
