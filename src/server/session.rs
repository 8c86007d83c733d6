//! Per-connection session state machine
//!
//! ```text
//! PreInit --recv initialize--> InitPending --send initialize resp--> AwaitingInitialized
//! AwaitingInitialized --recv notifications/initialized--> Initialized
//! Initialized --shutdown signal--> ShuttingDown
//! Any --transport close--> ShuttingDown
//! ```
//!
//! The session owns the outbound notification gate: nothing (other than the
//! handshake itself) reaches the wire before the peer's
//! `notifications/initialized`. Registrations before `initialize` are folded
//! into the capability advertisement; registrations between `initialize` and
//! `initialized` accumulate as `list_changed` debt released exactly once per
//! list afterwards.
//!
//! `env` comes exclusively from transport-layer data (process env for stdio,
//! headers for HTTP-family transports); `initialize` params never touch it.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::protocol::codec;
use crate::protocol::messages::{InitializeParams, InitializeResult};
use crate::protocol::methods;
use crate::protocol::types::{
    ClientCapabilities, Implementation, JsonRpcNotification, LoggingLevel, PromptsCapability,
    ResourcesCapability, Root, ServerCapabilities, ToolsCapability,
};
use crate::protocol::version::{self, ProtocolVersion};
use crate::server::registry::{HandlerRegistry, ListKind};

/// Coalescing window for post-init `list_changed` bursts
pub const LIST_CHANGED_DEBOUNCE: Duration = Duration::from_millis(50);

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No initialize request seen yet
    PreInit,
    /// Initialize received, response not yet sent
    InitPending,
    /// Initialize answered, waiting for `notifications/initialized`
    AwaitingInitialized,
    /// Fully initialized; notifications flow
    Initialized,
    /// Closing down; outbound traffic is dropped
    ShuttingDown,
}

/// Connection-scoped data supplied by the transport, never by the peer's
/// `initialize` params
#[derive(Debug, Clone, Default)]
pub struct SessionTransportData {
    /// Environment visible to this connection (process env for stdio,
    /// headers for HTTP-family transports)
    pub env: HashMap<String, String>,
    /// Initial workspace roots known at the transport layer
    pub roots: Vec<PathBuf>,
}

/// Per-connection session state
pub struct Session {
    id: String,
    state: Mutex<SessionState>,
    negotiated_version: Mutex<Option<ProtocolVersion>>,
    peer_capabilities: Mutex<Option<ClientCapabilities>>,
    env: HashMap<String, String>,
    roots: Mutex<Vec<PathBuf>>,
    logging_level: Mutex<Option<LoggingLevel>>,
    outgoing_tx: mpsc::UnboundedSender<Vec<u8>>,
    held_notifications: Mutex<Vec<JsonRpcNotification>>,
    list_changed_debt: Mutex<HashSet<ListKind>>,
    debounce_pending: Arc<Mutex<HashSet<ListKind>>>,
    debounce_scheduled: Arc<AtomicBool>,
    wants_roots_pull: AtomicBool,
}

impl Session {
    /// Create a session; the receiver drains encoded outbound frames
    /// (notifications and server-initiated requests).
    pub fn new(transport: SessionTransportData) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            state: Mutex::new(SessionState::PreInit),
            negotiated_version: Mutex::new(None),
            peer_capabilities: Mutex::new(None),
            env: transport.env,
            roots: Mutex::new(transport.roots),
            logging_level: Mutex::new(None),
            outgoing_tx: tx,
            held_notifications: Mutex::new(Vec::new()),
            list_changed_debt: Mutex::new(HashSet::new()),
            debounce_pending: Arc::new(Mutex::new(HashSet::new())),
            debounce_scheduled: Arc::new(AtomicBool::new(false)),
            wants_roots_pull: AtomicBool::new(false),
        });
        (session, rx)
    }

    /// Session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state poisoned")
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        *self.state.lock().expect("session state poisoned") = next;
    }

    /// Negotiated revision; [`ProtocolVersion::oldest`] until the handshake
    /// settles it
    pub fn version(&self) -> ProtocolVersion {
        self.negotiated_version
            .lock()
            .expect("session version poisoned")
            .unwrap_or_else(ProtocolVersion::oldest)
    }

    /// Peer capabilities stored verbatim at initialize
    pub fn peer_capabilities(&self) -> Option<ClientCapabilities> {
        self.peer_capabilities
            .lock()
            .expect("peer caps poisoned")
            .clone()
    }

    /// Transport-sourced environment; never populated from initialize params
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Ordered workspace roots
    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.lock().expect("roots poisoned").clone()
    }

    /// Append roots, preserving order and dropping duplicates
    pub fn add_roots<I: IntoIterator<Item = PathBuf>>(&self, new_roots: I) {
        let mut roots = self.roots.lock().expect("roots poisoned");
        for root in new_roots {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
    }

    /// Minimum severity the peer asked for via `logging/setLevel`
    pub fn logging_level(&self) -> Option<LoggingLevel> {
        *self.logging_level.lock().expect("logging level poisoned")
    }

    /// Store the peer's requested logging level
    pub fn set_logging_level(&self, level: LoggingLevel) {
        *self.logging_level.lock().expect("logging level poisoned") = Some(level);
    }

    /// Whether a deferred `roots/list` pull is owed once initialized
    pub fn wants_roots_pull(&self) -> bool {
        self.wants_roots_pull.load(Ordering::Acquire)
    }

    pub(crate) fn clear_roots_pull(&self) {
        self.wants_roots_pull.store(false, Ordering::Release);
    }

    /// Whether any method other than initialize/ping must be rejected with
    /// `-32002`
    pub fn gate_requests(&self) -> bool {
        self.state() == SessionState::PreInit
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Process `initialize`: negotiate the version, store peer capabilities
    /// verbatim, consume inline file-URI roots, and compute our capability
    /// advertisement from the registered content.
    ///
    /// Per MCP compliance, `environment` keys a peer may place in
    /// `clientInfo` are never consumed: env is transport-sourced only.
    pub fn handle_initialize(
        &self,
        params: &InitializeParams,
        server_info: &Implementation,
        registry: &HandlerRegistry,
        instructions: Option<String>,
    ) -> InitializeResult {
        self.set_state(SessionState::InitPending);

        let negotiated = version::negotiate(&params.protocol_version);
        *self
            .negotiated_version
            .lock()
            .expect("session version poisoned") = Some(negotiated);

        if params.capabilities.roots.is_some() {
            self.wants_roots_pull.store(true, Ordering::Release);
        }
        *self.peer_capabilities.lock().expect("peer caps poisoned") =
            Some(params.capabilities.clone());

        if let Some(inline_roots) = &params.client_info.roots {
            self.add_roots(file_uri_roots(inline_roots));
        }

        let capabilities = compute_capabilities(registry);
        let result = InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities,
            server_info: Implementation {
                roots: None,
                ..server_info.clone()
            },
            instructions,
            meta: None,
        };

        // The response is about to be written; from the peer's view we are
        // now waiting on notifications/initialized.
        self.set_state(SessionState::AwaitingInitialized);
        result
    }

    /// Process `notifications/initialized`: open the notification gate,
    /// flush held notifications, and release `list_changed` debt exactly
    /// once per affected list.
    ///
    /// Returns whether the deferred `roots/list` pull should run now.
    pub fn mark_initialized(&self) -> bool {
        self.set_state(SessionState::Initialized);

        let held: Vec<JsonRpcNotification> = std::mem::take(
            &mut *self
                .held_notifications
                .lock()
                .expect("held notifications poisoned"),
        );
        for notification in held {
            self.write_notification(&notification);
        }

        let mut debt: Vec<ListKind> = self
            .list_changed_debt
            .lock()
            .expect("list_changed debt poisoned")
            .drain()
            .collect();
        debt.sort_by_key(|k| match k {
            ListKind::Tools => 0,
            ListKind::Resources => 1,
            ListKind::Prompts => 2,
        });
        for kind in debt {
            self.write_notification(&list_changed_notification(kind));
        }

        self.wants_roots_pull()
    }

    /// Transition to ShuttingDown; further outbound traffic is dropped
    pub fn begin_shutdown(&self) {
        self.set_state(SessionState::ShuttingDown);
    }

    // ========================================================================
    // Notification gate
    // ========================================================================

    /// Queue a notification, honoring the post-init gate.
    pub fn notify(self: &Arc<Self>, notification: JsonRpcNotification) {
        match self.state() {
            SessionState::Initialized => self.write_notification(&notification),
            SessionState::ShuttingDown => {
                debug!(session = %self.id, method = %notification.method, "notification dropped during shutdown");
            }
            _ => self
                .held_notifications
                .lock()
                .expect("held notifications poisoned")
                .push(notification),
        }
    }

    /// Record a list mutation, honoring the gate and the debounce window.
    ///
    /// Pre-`initialize` mutations are folded into the capability
    /// advertisement instead of producing notifications.
    pub fn notify_list_changed(self: &Arc<Self>, kind: ListKind) {
        match self.state() {
            SessionState::PreInit | SessionState::ShuttingDown => {}
            SessionState::InitPending | SessionState::AwaitingInitialized => {
                self.list_changed_debt
                    .lock()
                    .expect("list_changed debt poisoned")
                    .insert(kind);
            }
            SessionState::Initialized => self.debounce_list_changed(kind),
        }
    }

    fn debounce_list_changed(self: &Arc<Self>, kind: ListKind) {
        self.debounce_pending
            .lock()
            .expect("debounce pending poisoned")
            .insert(kind);
        if self
            .debounce_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let session = Arc::downgrade(self);
            tokio::spawn(async move {
                tokio::time::sleep(LIST_CHANGED_DEBOUNCE).await;
                if let Some(session) = session.upgrade() {
                    session.debounce_scheduled.store(false, Ordering::Release);
                    let mut kinds: Vec<ListKind> = session
                        .debounce_pending
                        .lock()
                        .expect("debounce pending poisoned")
                        .drain()
                        .collect();
                    kinds.sort_by_key(|k| match k {
                        ListKind::Tools => 0,
                        ListKind::Resources => 1,
                        ListKind::Prompts => 2,
                    });
                    for kind in kinds {
                        session.write_notification(&list_changed_notification(kind));
                    }
                }
            });
        }
    }

    fn write_notification(&self, notification: &JsonRpcNotification) {
        match codec::encode_notification(notification) {
            Ok(bytes) => {
                if self.outgoing_tx.send(bytes).is_err() {
                    debug!(session = %self.id, "outbound channel closed");
                }
            }
            Err(e) => warn!(session = %self.id, error = %e, "notification encode failed"),
        }
    }

    /// Queue an already-encoded frame (server-initiated requests)
    pub(crate) fn write_frame(&self, bytes: Vec<u8>) -> bool {
        self.outgoing_tx.send(bytes).is_ok()
    }
}

/// Build the `list_changed` notification for a list kind
pub fn list_changed_notification(kind: ListKind) -> JsonRpcNotification {
    let method = match kind {
        ListKind::Tools => methods::TOOLS_LIST_CHANGED,
        ListKind::Resources => methods::RESOURCES_LIST_CHANGED,
        ListKind::Prompts => methods::PROMPTS_LIST_CHANGED,
    };
    JsonRpcNotification {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params: None,
    }
}

/// Compute the server capability advertisement from registered content:
/// tools present ⇒ `tools.listChanged`, resources ⇒ `resources.subscribe` +
/// `listChanged`, prompts ⇒ `prompts.listChanged`. Logging is always
/// advertised.
pub fn compute_capabilities(registry: &HandlerRegistry) -> ServerCapabilities {
    let snapshot = registry.load();
    ServerCapabilities {
        tools: snapshot.has_tools().then(|| ToolsCapability {
            list_changed: Some(true),
        }),
        resources: snapshot.has_resources().then(|| ResourcesCapability {
            subscribe: Some(true),
            list_changed: Some(true),
        }),
        prompts: snapshot.has_prompts().then(|| PromptsCapability {
            list_changed: Some(true),
        }),
        logging: Some(Default::default()),
        completions: None,
        experimental: None,
        extra: HashMap::new(),
    }
}

/// Extract filesystem paths from inline roots, keeping only `file://` URIs
/// (percent-decoded); everything else is silently ignored.
pub fn file_uri_roots(roots: &[Root]) -> Vec<PathBuf> {
    roots
        .iter()
        .filter_map(|root| {
            let url = Url::parse(&root.uri).ok()?;
            if url.scheme() != "file" {
                return None;
            }
            url.to_file_path().ok()
        })
        .collect()
}
