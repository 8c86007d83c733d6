//! Parent watchdog for spawned MCP servers
//!
//! A child server must not outlive its parent. Two independent signals mark
//! parent death: the child is re-parented to init (`getppid() == 1`), and the
//! stdin pipe reaches EOF/POLLHUP. The stdio server transport already
//! surfaces the latter; this watchdog covers the former by polling.
//!
//! The watchdog only observes its own parent; the library installs no
//! process-wide signal handlers on behalf of the embedding application.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// How often the parent pid is polled
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watches for parent death and resolves `trigger` when it happens
pub struct ParentWatchdog {
    trigger: CancellationToken,
    stopped: CancellationToken,
}

impl ParentWatchdog {
    /// Start watching. `trigger` resolves when the parent dies; drop the
    /// watchdog (or call [`ParentWatchdog::stop`]) to stop polling.
    pub fn spawn() -> Self {
        let trigger = CancellationToken::new();
        let stopped = CancellationToken::new();

        let trigger_out = trigger.clone();
        let stopped_in = stopped.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped_in.cancelled() => break,
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                if parent_died() {
                    info!("parent process exited; initiating shutdown");
                    trigger_out.cancel();
                    break;
                }
            }
        });

        Self { trigger, stopped }
    }

    /// Token resolved when the parent dies
    pub fn triggered(&self) -> CancellationToken {
        self.trigger.clone()
    }

    /// Stop polling without triggering
    pub fn stop(&self) {
        self.stopped.cancel();
    }
}

impl Drop for ParentWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn parent_died() -> bool {
    // Re-parented to init (or a subreaper at pid 1 in containers).
    unsafe { libc::getppid() == 1 }
}

#[cfg(not(unix))]
fn parent_died() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watchdog_idle_while_parent_lives() {
        // This test process has a live parent (the test harness), so the
        // watchdog must stay quiet.
        let watchdog = ParentWatchdog::spawn();
        let triggered = watchdog.triggered();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!triggered.is_cancelled());
        watchdog.stop();
    }
}
