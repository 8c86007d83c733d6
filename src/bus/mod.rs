//! Typed publish/subscribe event bus
//!
//! The bus decouples registration, invocation, and resource-change events
//! from network I/O. Subjects are identified by string name and carry one
//! declared value type; publishing a different type to an existing subject is
//! an error, not a panic.
//!
//! Delivery model:
//! - publishes enqueue into a subject-wide bounded channel; if space does not
//!   free up within [`PUBLISH_DEADLINE`] the publish fails with a recoverable
//!   error and the event is dropped
//! - live events are fanned out asynchronously; each subscriber sees its own
//!   stream in publication order, but streams are not cross-ordered
//! - subscribing with replay enabled delivers the retained suffix in
//!   publication order ahead of any further live event for that subscriber
//! - handler errors are logged with the subject name and never terminate the
//!   subscription

pub mod events;

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{McpError, McpResult};

/// How long a publish may wait for subject-channel space
pub const PUBLISH_DEADLINE: Duration = Duration::from_millis(100);

/// Per-subject configuration
#[derive(Debug, Clone)]
pub struct SubjectConfig {
    /// Capacity of the subject-wide publish channel
    pub buffer_size: usize,
    /// Number of most-recent events retained for replay (0 disables)
    pub replay_depth: usize,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            replay_depth: 0,
        }
    }
}

/// Well-known subject names
pub mod topics {
    pub const SERVER_INITIALIZED: &str = "server.initialized";
    pub const SERVER_SHUTDOWN: &str = "server.shutdown";
    pub const CLIENT_CONNECTED: &str = "client.connected";
    pub const CLIENT_DISCONNECTED: &str = "client.disconnected";
    pub const TOOL_REGISTERED: &str = "tool.registered";
    pub const TOOL_EXECUTED: &str = "tool.executed";
    pub const RESOURCE_REGISTERED: &str = "resource.registered";
    pub const RESOURCE_ACCESSED: &str = "resource.accessed";
    pub const RESOURCE_CHANGED: &str = "resource.changed";
    pub const PROMPT_REGISTERED: &str = "prompt.registered";
    pub const PROMPT_EXECUTED: &str = "prompt.executed";
    pub const REQUEST_FAILED: &str = "request.failed";
}

struct Subscriber<T> {
    sender: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
}

struct SubjectState<T> {
    subscribers: HashMap<u64, Subscriber<T>>,
    replay: std::collections::VecDeque<T>,
}

/// A typed subject on the bus
pub struct Subject<T> {
    name: String,
    config: SubjectConfig,
    publish_tx: mpsc::Sender<T>,
    state: Arc<Mutex<SubjectState<T>>>,
    next_sub_id: AtomicU64,
    shut_down: Arc<AtomicBool>,
    worker_cancel: CancellationToken,
}

impl<T: Clone + Send + 'static> Subject<T> {
    fn new(name: String, config: SubjectConfig) -> Arc<Self> {
        let (publish_tx, mut publish_rx) = mpsc::channel::<T>(config.buffer_size.max(1));
        let state = Arc::new(Mutex::new(SubjectState {
            subscribers: HashMap::new(),
            replay: std::collections::VecDeque::new(),
        }));
        let subject = Arc::new(Self {
            name,
            config,
            publish_tx,
            state: state.clone(),
            next_sub_id: AtomicU64::new(0),
            shut_down: Arc::new(AtomicBool::new(false)),
            worker_cancel: CancellationToken::new(),
        });

        // Fan-out worker: drains the subject channel, appends to the replay
        // buffer, and forwards to every live subscriber queue. The state lock
        // is the ordering point between fan-out and replay-on-subscribe.
        let replay_depth = subject.config.replay_depth;
        let worker_cancel = subject.worker_cancel.clone();
        let subject_name = subject.name.clone();
        tokio::spawn(async move {
            loop {
                let value = tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    v = publish_rx.recv() => match v {
                        Some(v) => v,
                        None => break,
                    },
                };
                let mut state = state.lock().expect("subject state poisoned");
                if replay_depth > 0 {
                    state.replay.push_back(value.clone());
                    while state.replay.len() > replay_depth {
                        state.replay.pop_front();
                    }
                }
                state.subscribers.retain(|id, sub| {
                    if sub.sender.send(value.clone()).is_err() {
                        debug!(subject = %subject_name, subscriber = id, "dropping closed subscriber");
                        false
                    } else {
                        true
                    }
                });
            }
        });

        subject
    }

    /// The subject name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a value to the subject.
    ///
    /// Fails when the subject is shut down or the channel stays full past
    /// [`PUBLISH_DEADLINE`]; both are recoverable from the caller's view and
    /// the event is dropped.
    pub async fn publish(&self, value: T) -> McpResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(McpError::bus(format!(
                "subject '{}' is shut down",
                self.name
            )));
        }
        self.publish_tx
            .send_timeout(value, PUBLISH_DEADLINE)
            .await
            .map_err(|_| {
                McpError::bus(format!(
                    "publish to subject '{}' timed out after {:?} (buffer full)",
                    self.name, PUBLISH_DEADLINE
                ))
            })
    }

    /// Subscribe with a handler, optionally replaying the retained suffix.
    ///
    /// With `replay` enabled (and a nonzero configured `replay_depth`) the
    /// retained events are queued, in publication order, ahead of any live
    /// event for this subscriber.
    pub fn subscribe<F, Fut>(&self, replay: bool, handler: F) -> McpResult<SubscriptionHandle>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = McpResult<()>> + Send,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(McpError::bus(format!(
                "subject '{}' is shut down",
                self.name
            )));
        }
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let cancel = CancellationToken::new();

        {
            let mut state = self.state.lock().expect("subject state poisoned");
            if replay {
                for event in &state.replay {
                    // Pre-loading under the lock guarantees replay precedes
                    // any live event the fan-out worker forwards later.
                    let _ = tx.send(event.clone());
                }
            }
            state.subscribers.insert(
                id,
                Subscriber {
                    sender: tx,
                    cancel: cancel.clone(),
                },
            );
        }

        let subject_name = self.name.clone();
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let value = tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    v = rx.recv() => match v {
                        Some(v) => v,
                        None => break,
                    },
                };
                if let Err(e) = handler(value).await {
                    warn!(subject = %subject_name, error = %e, "event handler failed");
                }
            }
        });

        Ok(SubscriptionHandle {
            id,
            cancel,
            unsubscribe: {
                let state = Arc::downgrade(&self.state);
                Arc::new(move |sub_id| {
                    if let Some(state) = state.upgrade() {
                        let mut state = state.lock().expect("subject state poisoned");
                        if let Some(sub) = state.subscribers.remove(&sub_id) {
                            sub.cancel.cancel();
                        }
                    }
                })
            },
        })
    }

    /// Shut down the subject: cancel all subscriptions and reject further
    /// publishes.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.worker_cancel.cancel();
        let mut state = self.state.lock().expect("subject state poisoned");
        for (_, sub) in state.subscribers.drain() {
            sub.cancel.cancel();
        }
    }
}

/// Handle owning one subscription; dropping it stops deliveries
pub struct SubscriptionHandle {
    id: u64,
    cancel: CancellationToken,
    unsubscribe: Arc<dyn Fn(u64) + Send + Sync>,
}

impl SubscriptionHandle {
    /// Stop deliveries to this subscriber
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
        (self.unsubscribe)(self.id);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct SubjectSlot {
    subject: Arc<dyn Any + Send + Sync>,
    shutdown: Box<dyn Fn() + Send + Sync>,
}

/// Process-wide event bus holding named, typed subjects
#[derive(Default)]
pub struct EventBus {
    subjects: Mutex<HashMap<String, SubjectSlot>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the subject `name` with value type `T`.
    ///
    /// The configuration applies only on first creation. Requesting an
    /// existing subject with a different value type fails.
    pub fn subject<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
        config: SubjectConfig,
    ) -> McpResult<Arc<Subject<T>>> {
        let mut subjects = self.subjects.lock().expect("bus subjects poisoned");
        if let Some(slot) = subjects.get(name) {
            return slot.subject.clone().downcast::<Subject<T>>().map_err(|_| {
                McpError::bus(format!(
                    "subject '{name}' already exists with a different value type"
                ))
            });
        }
        let subject = Subject::<T>::new(name.to_string(), config);
        let for_shutdown = subject.clone();
        subjects.insert(
            name.to_string(),
            SubjectSlot {
                subject: subject.clone(),
                shutdown: Box::new(move || for_shutdown.shutdown()),
            },
        );
        Ok(subject)
    }

    /// Shut down every subject on the bus
    pub fn shutdown(&self) {
        let subjects = self.subjects.lock().expect("bus subjects poisoned");
        for slot in subjects.values() {
            (slot.shutdown)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{Duration, sleep};

    #[tokio::test]
    async fn test_publish_subscribe_round_trip() {
        let bus = EventBus::new();
        let subject = bus
            .subject::<String>("test.subject", SubjectConfig::default())
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        let _sub = subject
            .subscribe(false, move |v: String| {
                let seen = seen_in_handler.clone();
                async move {
                    seen.lock().unwrap().push(v);
                    Ok(())
                }
            })
            .unwrap();

        subject.publish("one".to_string()).await.unwrap();
        subject.publish("two".to_string()).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_replay_precedes_live() {
        let bus = EventBus::new();
        let subject = bus
            .subject::<u32>(
                "replay.subject",
                SubjectConfig {
                    buffer_size: 16,
                    replay_depth: 2,
                },
            )
            .unwrap();

        subject.publish(1).await.unwrap();
        subject.publish(2).await.unwrap();
        subject.publish(3).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        let _sub = subject
            .subscribe(true, move |v: u32| {
                let seen = seen_in_handler.clone();
                async move {
                    seen.lock().unwrap().push(v);
                    Ok(())
                }
            })
            .unwrap();
        subject.publish(4).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        // Replay depth is 2, so the retained suffix [2, 3] arrives before 4.
        assert_eq!(*seen.lock().unwrap(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let subject = bus
            .subject::<u32>("unsub.subject", SubjectConfig::default())
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_in_handler = count.clone();
        let sub = subject
            .subscribe(false, move |_| {
                let count = count_in_handler.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        subject.publish(1).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        sub.unsubscribe();
        subject.publish(2).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_kill_subscription() {
        let bus = EventBus::new();
        let subject = bus
            .subject::<u32>("err.subject", SubjectConfig::default())
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_in_handler = count.clone();
        let _sub = subject
            .subscribe(false, move |v: u32| {
                let count = count_in_handler.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    if v == 1 {
                        Err(McpError::internal("boom"))
                    } else {
                        Ok(())
                    }
                }
            })
            .unwrap();

        subject.publish(1).await.unwrap();
        subject.publish(2).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_publish() {
        let bus = EventBus::new();
        let subject = bus
            .subject::<u32>("shut.subject", SubjectConfig::default())
            .unwrap();
        subject.shutdown();
        let err = subject.publish(1).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(subject.subscribe(false, |_| async { Ok(()) }).is_err());
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected() {
        let bus = EventBus::new();
        let _a = bus
            .subject::<String>("typed.subject", SubjectConfig::default())
            .unwrap();
        assert!(bus
            .subject::<u32>("typed.subject", SubjectConfig::default())
            .is_err());
        // Same type is fine and returns the same subject
        let again = bus
            .subject::<String>("typed.subject", SubjectConfig::default())
            .unwrap();
        assert_eq!(again.name(), "typed.subject");
    }
}
