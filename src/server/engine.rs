//! Protocol engine and server facade
//!
//! [`McpServer`] owns the shared collaborators (handler registry, event bus,
//! subscription index, progress token manager). Each transport connection
//! gets a [`ServerConnection`], which drives the per-connection engine:
//! frame decoding, session gating, dispatch, batch orchestration, outbound
//! correlation, and the notification writer queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::bus::events::{InvocationEvent, ResourceEvent, SessionEvent};
use crate::bus::{EventBus, SubjectConfig, topics};
use crate::core::completion::CompletionHandler;
use crate::core::context::RequestContext;
use crate::core::error::{McpError, McpResult};
use crate::core::prompt::{PromptEntry, PromptHandler};
use crate::core::resource::{ResourceEntry, ResourceHandler, ResourceTemplateEntry};
use crate::core::tool::{ToolEntry, ToolHandler};
use crate::progress::{ProgressReporter, ProgressSink, ProgressTokenManager, RateLimiterConfig};
use crate::protocol::codec::{self, Decoded, Envelope};
use crate::protocol::messages::*;
use crate::protocol::methods;
use crate::protocol::projection;
use crate::protocol::types::*;
use crate::server::cancellation::CancellationFabric;
use crate::server::registry::{CompletionTarget, HandlerRegistry, ListKind};
use crate::server::sampling::SamplingRouter;
use crate::server::session::{Session, SessionTransportData, file_uri_roots};
use crate::server::subscriptions::SubscriptionManager;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deadline for outbound (server→client) requests
    pub request_timeout: Duration,
    /// Rate limiter configuration applied to new progress reporters
    pub progress_limiter: RateLimiterConfig,
    /// Optional instructions returned from `initialize`
    pub instructions: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            progress_limiter: RateLimiterConfig::default(),
            instructions: None,
        }
    }
}

/// Shared MCP server: registries plus per-connection engine factory
pub struct McpServer {
    info: ServerInfo,
    config: ServerConfig,
    registry: Arc<HandlerRegistry>,
    bus: Arc<EventBus>,
    subscriptions: Arc<SubscriptionManager>,
    progress: Arc<ProgressTokenManager>,
    connections: Arc<Mutex<HashMap<String, Weak<ServerConnection>>>>,
    fanout_wired: AtomicBool,
    fanout_handle: Mutex<Option<crate::bus::SubscriptionHandle>>,
}

impl McpServer {
    /// Create a server with the given identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Arc<Self> {
        Self::with_config(name, version, ServerConfig::default())
    }

    /// Create a server with custom configuration
    pub fn with_config(
        name: impl Into<String>,
        version: impl Into<String>,
        config: ServerConfig,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        Arc::new(Self {
            info: Implementation::new(name.into(), version.into()),
            config,
            registry: Arc::new(HandlerRegistry::new(bus.clone())),
            bus,
            subscriptions: Arc::new(SubscriptionManager::new()),
            progress: Arc::new(ProgressTokenManager::new()),
            connections: Arc::new(Mutex::new(HashMap::new())),
            fanout_wired: AtomicBool::new(false),
            fanout_handle: Mutex::new(None),
        })
    }

    /// Server identity
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// The shared handler registry
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The process-wide event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The progress token manager
    pub fn progress(&self) -> &Arc<ProgressTokenManager> {
        &self.progress
    }

    /// The resource subscription index
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Register a tool from a JSON-Schema object and handler
    pub async fn add_tool<H>(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        schema: Value,
        handler: H,
    ) -> McpResult<()>
    where
        H: ToolHandler + 'static,
    {
        self.registry
            .add_tool(ToolEntry::new(name, description, schema, handler))
            .await
    }

    /// Register an exact-URI resource
    pub async fn add_resource<H>(
        &self,
        uri: impl Into<String>,
        name: impl Into<String>,
        handler: H,
    ) -> McpResult<()>
    where
        H: ResourceHandler + 'static,
    {
        self.registry
            .add_resource(ResourceEntry::new(uri, name, handler))
            .await
    }

    /// Register a templated resource
    pub async fn add_resource_template<H>(
        &self,
        uri_template: impl Into<String>,
        name: impl Into<String>,
        handler: H,
    ) -> McpResult<()>
    where
        H: ResourceHandler + 'static,
    {
        self.registry
            .add_resource_template(ResourceTemplateEntry::new(uri_template, name, handler)?)
            .await
    }

    /// Register a prompt
    pub async fn add_prompt<H>(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        arguments: Option<Vec<PromptArgument>>,
        handler: H,
    ) -> McpResult<()>
    where
        H: PromptHandler + 'static,
    {
        self.registry
            .add_prompt(PromptEntry::new(name, description, arguments, handler))
            .await
    }

    /// Register an argument completion handler
    pub fn add_completion<H>(&self, target: CompletionTarget, handler: H) -> McpResult<()>
    where
        H: CompletionHandler + 'static,
    {
        self.registry.add_completion(target, handler)
    }

    /// Announce an external resource change; subscribed sessions receive
    /// `resources/list_changed` plus a per-URI `resources/updated`.
    pub async fn resource_changed(&self, uri: &str) -> McpResult<()> {
        let subject = self
            .bus
            .subject::<ResourceEvent>(topics::RESOURCE_CHANGED, SubjectConfig::default())?;
        subject
            .publish(ResourceEvent {
                uri: uri.to_string(),
            })
            .await
    }

    /// Create the engine for one transport connection.
    ///
    /// Returns the connection and the receiver of encoded outbound frames
    /// (notifications and server-initiated requests) the transport must
    /// drain.
    pub async fn connect(
        self: &Arc<Self>,
        transport: SessionTransportData,
    ) -> (Arc<ServerConnection>, mpsc::UnboundedReceiver<Vec<u8>>) {
        self.wire_resource_fanout().await;

        let (session, outgoing_rx) = Session::new(transport);
        let connection = Arc::new(ServerConnection {
            server: Arc::downgrade(self),
            info: self.info.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            bus: self.bus.clone(),
            subscriptions: self.subscriptions.clone(),
            progress: self.progress.clone(),
            session,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            cancellations: CancellationFabric::new(),
            sampling: SamplingRouter::new(),
        });

        self.connections.lock().expect("connections poisoned").insert(
            connection.session.id().to_string(),
            Arc::downgrade(&connection),
        );

        // Registry mutations schedule this session's debounced list_changed.
        let mut watch = self.registry.watch();
        let weak = Arc::downgrade(&connection);
        tokio::spawn(async move {
            while let Some(kind) = watch.recv().await {
                match weak.upgrade() {
                    Some(conn) => conn.session.notify_list_changed(kind),
                    None => break,
                }
            }
        });

        self.publish_session_event(topics::CLIENT_CONNECTED, connection.session.id())
            .await;
        (connection, outgoing_rx)
    }

    async fn wire_resource_fanout(self: &Arc<Self>) {
        if self
            .fanout_wired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let subject = match self
            .bus
            .subject::<ResourceEvent>(topics::RESOURCE_CHANGED, SubjectConfig::default())
        {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "resource.changed subject unavailable");
                return;
            }
        };
        let connections = self.connections.clone();
        let subscriptions = self.subscriptions.clone();
        let handle = subject.subscribe(false, move |event: ResourceEvent| {
            let connections = connections.clone();
            let subscriptions = subscriptions.clone();
            async move {
                let targets = subscriptions.sessions_for(&event.uri);
                let map = connections.lock().expect("connections poisoned");
                for session_id in targets {
                    if let Some(conn) = map.get(&session_id).and_then(Weak::upgrade) {
                        conn.notify_resource_changed(&event.uri);
                    }
                }
                Ok(())
            }
        });
        match handle {
            Ok(handle) => {
                *self.fanout_handle.lock().expect("fanout handle poisoned") = Some(handle)
            }
            Err(e) => warn!(error = %e, "resource.changed fan-out not wired"),
        }
    }

    async fn publish_session_event(&self, topic: &str, session_id: &str) {
        if let Ok(subject) = self
            .bus
            .subject::<SessionEvent>(topic, SubjectConfig::default())
        {
            let _ = subject
                .publish(SessionEvent {
                    session_id: session_id.to_string(),
                    version: None,
                })
                .await;
        }
    }
}

struct PendingCall {
    method: String,
    started_at: Instant,
    responder: oneshot::Sender<McpResult<Value>>,
}

/// Per-connection protocol engine
pub struct ServerConnection {
    server: Weak<McpServer>,
    info: ServerInfo,
    config: ServerConfig,
    registry: Arc<HandlerRegistry>,
    bus: Arc<EventBus>,
    subscriptions: Arc<SubscriptionManager>,
    progress: Arc<ProgressTokenManager>,
    session: Arc<Session>,
    pending: Mutex<HashMap<i64, PendingCall>>,
    next_id: AtomicI64,
    cancellations: CancellationFabric,
    sampling: SamplingRouter,
}

impl ServerConnection {
    /// The connection's session
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Process one inbound frame. Returns the encoded response frame, or
    /// `None` when the input produces no write (notifications, responses).
    pub async fn handle_frame(self: &Arc<Self>, bytes: &[u8]) -> Option<Vec<u8>> {
        match codec::decode_message(bytes) {
            Decoded::Reject(err) => codec::encode_error(&err).ok(),
            Decoded::Single(envelope) => match self.handle_envelope(envelope).await {
                Some(value) => serde_json::to_vec(&value).ok(),
                None => None,
            },
            Decoded::Batch(envelopes) => {
                // Members run concurrently; collecting through join_all
                // preserves input order in the response array regardless of
                // completion order.
                let futures = envelopes
                    .into_iter()
                    .map(|envelope| self.handle_envelope(envelope));
                let results = futures::future::join_all(futures).await;
                let responses: Vec<Value> = results.into_iter().flatten().collect();
                codec::encode_batch(&responses).ok().flatten()
            }
        }
    }

    async fn handle_envelope(self: &Arc<Self>, envelope: Envelope) -> Option<Value> {
        match envelope {
            Envelope::Invalid(err) => serde_json::to_value(&err).ok(),
            Envelope::Request(req) => {
                let response = self.process_request(req).await;
                serde_json::to_value(&response).ok()
            }
            Envelope::Notification(n) => {
                self.process_notification(n).await;
                None
            }
            Envelope::Response(resp) => {
                self.resolve_pending(resp.id, Ok(resp.result));
                None
            }
            Envelope::Error(err) => {
                let id = err.id.clone();
                self.resolve_pending(
                    id,
                    Err(McpError::Protocol(format!(
                        "peer error {}: {}",
                        err.error.code, err.error.message
                    ))),
                );
                None
            }
        }
    }

    // ========================================================================
    // Inbound requests
    // ========================================================================

    async fn process_request(self: &Arc<Self>, req: JsonRpcRequest) -> JsonRpcMessage {
        let method = req.method.clone();
        let id = req.id.clone();

        if self.session.gate_requests()
            && method != methods::INITIALIZE
            && method != methods::PING
        {
            return error_message(
                id,
                error_codes::SERVER_NOT_INITIALIZED,
                "Server not initialized",
                None,
            );
        }

        let cancel = self.cancellations.install(&id);
        let progress_token = req.progress_token();
        if let Some(token) = &progress_token {
            self.progress
                .register(token.clone(), id.clone(), self.session.version());
        }
        let ctx = RequestContext {
            request_id: id.clone(),
            cancellation: cancel,
            progress_token,
        };

        let outcome = self.dispatch(&req, &ctx).await;
        self.cancellations.complete(&id);

        match outcome {
            Ok(result) => match JsonRpcResponse::success(id.clone(), result) {
                Ok(resp) => JsonRpcMessage::Response(resp),
                Err(e) => error_message(
                    id,
                    error_codes::INTERNAL_ERROR,
                    format!("response encoding failed: {e}"),
                    None,
                ),
            },
            Err(err) => {
                self.publish_request_failed(&method, err.jsonrpc_code()).await;
                error_message(id, err.jsonrpc_code(), err.to_string(), None)
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, req: &JsonRpcRequest, ctx: &RequestContext) -> McpResult<Value> {
        match req.method.as_str() {
            methods::INITIALIZE => {
                let params: InitializeParams = parse_params(req.params.clone())?;
                let result = self.session.handle_initialize(
                    &params,
                    &self.info,
                    &self.registry,
                    self.config.instructions.clone(),
                );
                to_value(result)
            }
            methods::PING => to_value(EmptyResult {}),
            methods::TOOLS_LIST => {
                let _params: ListParams = parse_params_or_default(req.params.clone())?;
                let snapshot = self.registry.load();
                let mut tools: Vec<ToolInfo> =
                    snapshot.tools().into_iter().map(|t| t.info.clone()).collect();
                tools.sort_by(|a, b| a.name.cmp(&b.name));
                to_value(ListToolsResult {
                    tools,
                    next_cursor: None,
                })
            }
            methods::TOOLS_CALL => self.call_tool(req, ctx).await,
            methods::RESOURCES_LIST => {
                let _params: ListParams = parse_params_or_default(req.params.clone())?;
                let snapshot = self.registry.load();
                to_value(ListResourcesResult {
                    resources: snapshot.resources().iter().map(|r| r.info.clone()).collect(),
                    next_cursor: None,
                })
            }
            methods::RESOURCES_TEMPLATES_LIST => {
                let _params: ListParams = parse_params_or_default(req.params.clone())?;
                let snapshot = self.registry.load();
                to_value(ListResourceTemplatesResult {
                    resource_templates: snapshot
                        .templates()
                        .iter()
                        .map(|t| t.info.clone())
                        .collect(),
                    next_cursor: None,
                })
            }
            methods::RESOURCES_READ => self.read_resource(req, ctx).await,
            methods::RESOURCES_SUBSCRIBE => {
                let params: SubscribeResourceParams = parse_params(req.params.clone())?;
                self.subscriptions.subscribe(self.session.id(), &params.uri);
                to_value(EmptyResult {})
            }
            methods::RESOURCES_UNSUBSCRIBE => {
                let params: SubscribeResourceParams = parse_params(req.params.clone())?;
                self.subscriptions.unsubscribe(self.session.id(), &params.uri);
                to_value(EmptyResult {})
            }
            methods::PROMPTS_LIST => {
                let _params: ListParams = parse_params_or_default(req.params.clone())?;
                let snapshot = self.registry.load();
                let mut prompts: Vec<PromptInfo> = snapshot
                    .prompts()
                    .into_iter()
                    .map(|p| p.info.clone())
                    .collect();
                prompts.sort_by(|a, b| a.name.cmp(&b.name));
                to_value(ListPromptsResult {
                    prompts,
                    next_cursor: None,
                })
            }
            methods::PROMPTS_GET => self.get_prompt(req, ctx).await,
            methods::COMPLETION_COMPLETE => self.complete(req).await,
            methods::LOGGING_SET_LEVEL => {
                let params: SetLoggingLevelParams = parse_params(req.params.clone())?;
                self.session.set_logging_level(params.level);
                to_value(EmptyResult {})
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    async fn call_tool(self: &Arc<Self>, req: &JsonRpcRequest, ctx: &RequestContext) -> McpResult<Value> {
        let params: CallToolParams = parse_params(req.params.clone())?;
        let snapshot = self.registry.load();
        let entry = snapshot
            .tool(&params.name)
            .ok_or_else(|| McpError::ToolNotFound(params.name.clone()))?
            .clone();
        drop(snapshot);

        let raw_args = params.arguments.map(|m| Value::Object(m.into_iter().collect()));
        let arguments = entry.binder.bind(raw_args)?;

        let started = Instant::now();
        let outcome = entry.handler.call(arguments, ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => result,
            // The request was cancelled out from under the handler.
            Err(McpError::Cancelled(reason)) => return Err(McpError::Cancelled(reason)),
            // Tool domain errors are tool outcomes, not protocol errors.
            Err(err) => ToolResult::error(err.to_string()),
        };

        self.publish_invocation(topics::TOOL_EXECUTED, &params.name, !result.is_error, duration_ms)
            .await;

        let projected = projection::project_tool_result(&result, self.session.version())?;
        to_value(projected)
    }

    async fn read_resource(self: &Arc<Self>, req: &JsonRpcRequest, ctx: &RequestContext) -> McpResult<Value> {
        let params: ReadResourceParams = parse_params(req.params.clone())?;
        let snapshot = self.registry.load();
        let (handler, captures) = snapshot
            .resolve_resource(&params.uri)
            .ok_or_else(|| McpError::ResourceNotFound(params.uri.clone()))?;
        drop(snapshot);

        let contents = handler.read(&params.uri, &captures, ctx).await?;
        if let Ok(subject) = self
            .bus
            .subject::<ResourceEvent>(topics::RESOURCE_ACCESSED, SubjectConfig::default())
        {
            let _ = subject
                .publish(ResourceEvent {
                    uri: params.uri.clone(),
                })
                .await;
        }
        to_value(ReadResourceResult { contents })
    }

    async fn get_prompt(self: &Arc<Self>, req: &JsonRpcRequest, ctx: &RequestContext) -> McpResult<Value> {
        let params: GetPromptParams = parse_params(req.params.clone())?;
        let snapshot = self.registry.load();
        let entry = snapshot
            .prompt(&params.name)
            .ok_or_else(|| McpError::PromptNotFound(params.name.clone()))?
            .clone();
        drop(snapshot);

        let started = Instant::now();
        let result = entry
            .handler
            .render(params.arguments.unwrap_or_default(), ctx)
            .await?;
        self.publish_invocation(
            topics::PROMPT_EXECUTED,
            &params.name,
            true,
            started.elapsed().as_millis() as u64,
        )
        .await;

        let projected = projection::project_prompt_result(&result, self.session.version())?;
        to_value(projected)
    }

    async fn complete(self: &Arc<Self>, req: &JsonRpcRequest) -> McpResult<Value> {
        let params: CompleteParams = parse_params(req.params.clone())?;
        let target = match &params.reference {
            CompletionReference::Prompt { name } => CompletionTarget::Prompt(name.clone()),
            CompletionReference::Resource { uri } => CompletionTarget::Resource(uri.clone()),
        };
        let snapshot = self.registry.load();
        let completion = match snapshot.completion(&target) {
            Some(handler) => handler.complete(&params.argument).await?,
            None => CompletionData {
                values: Vec::new(),
                total: Some(0),
                has_more: Some(false),
            },
        };
        to_value(CompleteResult { completion })
    }

    // ========================================================================
    // Inbound notifications
    // ========================================================================

    async fn process_notification(self: &Arc<Self>, n: JsonRpcNotification) {
        match n.method.as_str() {
            methods::INITIALIZED => {
                let pull_roots = self.session.mark_initialized();
                if let Ok(subject) = self
                    .bus
                    .subject::<SessionEvent>(topics::SERVER_INITIALIZED, SubjectConfig::default())
                {
                    let _ = subject
                        .publish(SessionEvent {
                            session_id: self.session.id().to_string(),
                            version: Some(self.session.version()),
                        })
                        .await;
                }
                if pull_roots {
                    self.spawn_roots_pull();
                }
            }
            methods::CANCELLED => match parse_params::<CancelledParams>(n.params.clone()) {
                Ok(params) => self.cancellations.cancel(&params),
                Err(e) => debug!(error = %e, "malformed cancellation notification"),
            },
            methods::PROGRESS => match parse_params::<ProgressParams>(n.params.clone()) {
                Ok(params) => {
                    let token = match &params.progress_token {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if let Err(e) = self.progress.update_with_progress(&token, params.progress) {
                        debug!(token = %token, error = %e, "inbound progress rejected");
                    }
                }
                Err(e) => debug!(error = %e, "malformed progress notification"),
            },
            methods::SAMPLING_CHUNK => match parse_params::<SamplingChunkParams>(n.params.clone()) {
                Ok(params) => self.sampling.route_chunk(params),
                Err(e) => debug!(error = %e, "malformed sampling chunk"),
            },
            methods::ROOTS_LIST_CHANGED => {
                let advertised = self
                    .session
                    .peer_capabilities()
                    .is_some_and(|caps| caps.roots.is_some());
                if advertised {
                    self.spawn_roots_pull();
                }
            }
            other => debug!(method = other, "unhandled notification"),
        }
    }

    // ========================================================================
    // Outbound correlation
    // ========================================================================

    /// Issue a server→client request and await the response.
    ///
    /// Ids are allocated monotonically; a missing response past the
    /// configured deadline synthesizes `-32001 RequestCancelled`.
    pub async fn request<P: serde::Serialize>(
        self: &Arc<Self>,
        method: &str,
        params: Option<P>,
    ) -> McpResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(json!(id), method, params)?;
        let bytes = serde_json::to_vec(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("pending map poisoned").insert(
            id,
            PendingCall {
                method: method.to_string(),
                started_at: Instant::now(),
                responder: tx,
            },
        );

        if !self.session.write_frame(bytes) {
            self.pending.lock().expect("pending map poisoned").remove(&id);
            return Err(McpError::transport("outbound channel closed"));
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Cancelled(format!(
                "pending call for '{method}' dropped"
            ))),
            Err(_) => {
                self.pending.lock().expect("pending map poisoned").remove(&id);
                Err(McpError::Cancelled(format!(
                    "request '{method}' timed out after {:?}",
                    self.config.request_timeout
                )))
            }
        }
    }

    fn resolve_pending(&self, id: RequestId, result: McpResult<Value>) {
        let Some(id) = id.as_i64() else {
            warn!(id = %id, "response with non-integer id dropped");
            return;
        };
        let call = self.pending.lock().expect("pending map poisoned").remove(&id);
        match call {
            Some(call) => {
                debug!(
                    method = %call.method,
                    elapsed_ms = call.started_at.elapsed().as_millis() as u64,
                    "outbound request resolved"
                );
                let _ = call.responder.send(result);
            }
            None => debug!(id, "late response dropped"),
        }
    }

    /// Cancel an outbound request: resolve the local waiter and notify the
    /// peer via `notifications/cancelled`.
    pub fn cancel_outbound(&self, id: i64, reason: Option<String>) {
        self.resolve_pending(
            json!(id),
            Err(McpError::Cancelled(
                reason.clone().unwrap_or_else(|| "cancelled by caller".to_string()),
            )),
        );
        if let Ok(n) = JsonRpcNotification::new(
            methods::CANCELLED,
            Some(CancelledParams {
                request_id: json!(id),
                reason,
            }),
        ) {
            if let Ok(bytes) = codec::encode_notification(&n) {
                let _ = self.session.write_frame(bytes);
            }
        }
    }

    /// Pull `roots/list` from the peer and merge file roots into the session.
    fn spawn_roots_pull(self: &Arc<Self>) {
        let conn = self.clone();
        tokio::spawn(async move {
            match conn.request::<ListRootsParams>(methods::ROOTS_LIST, None).await {
                Ok(value) => match serde_json::from_value::<ListRootsResult>(value) {
                    Ok(result) => {
                        conn.session.add_roots(file_uri_roots(&result.roots));
                        conn.session.clear_roots_pull();
                    }
                    Err(e) => warn!(error = %e, "malformed roots/list result"),
                },
                Err(e) => warn!(error = %e, "roots/list pull failed"),
            }
        });
    }

    /// Issue `sampling/createMessage`, gating streaming and audio by the
    /// negotiated revision at projection time.
    pub async fn create_message(
        self: &Arc<Self>,
        params: CreateMessageParams,
    ) -> McpResult<CreateMessageResult> {
        let projected = projection::project_sampling_params(&params, self.session.version())?;
        let value = self
            .request(methods::SAMPLING_CREATE_MESSAGE, Some(projected))
            .await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("malformed sampling result: {e}")))
    }

    /// Open a chunk stream before issuing a streaming `create_message`; the
    /// id to watch is the next outbound id.
    pub fn sampling(&self) -> &SamplingRouter {
        &self.sampling
    }

    /// The id the next outbound request will use
    pub fn peek_next_request_id(&self) -> i64 {
        self.next_id.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Create a reporter feeding the request's progress token, or `None`
    /// when the request carried no token.
    pub fn reporter_for(
        self: &Arc<Self>,
        ctx: &RequestContext,
        total: Option<f64>,
    ) -> Option<Arc<ProgressReporter>> {
        let token = ctx.progress_token.clone()?;
        Some(ProgressReporter::new(
            token,
            ctx.request_id.clone(),
            total,
            self.progress.clone(),
            self.config.progress_limiter.clone(),
            Arc::new(SessionProgressSink {
                session: self.session.clone(),
            }),
        ))
    }

    fn notify_resource_changed(self: &Arc<Self>, uri: &str) {
        self.session
            .notify(crate::server::session::list_changed_notification(ListKind::Resources));
        if self.session.version().supports_resource_updated() {
            if let Ok(n) = JsonRpcNotification::new(
                methods::RESOURCES_UPDATED,
                Some(ResourceUpdatedParams {
                    uri: uri.to_string(),
                }),
            ) {
                self.session.notify(n);
            }
        }
    }

    /// Forward a log record to the peer, honoring the level set via
    /// `logging/setLevel`.
    pub fn log_message(self: &Arc<Self>, level: LoggingLevel, logger: Option<&str>, data: Value) {
        if let Some(min) = self.session.logging_level() {
            if level < min {
                return;
            }
        }
        if let Ok(n) = JsonRpcNotification::new(
            methods::LOGGING_MESSAGE,
            Some(LoggingMessageParams {
                level,
                logger: logger.map(String::from),
                data,
            }),
        ) {
            self.session.notify(n);
        }
    }

    /// Tear the connection down: cancel in-flight handlers, fail pending
    /// outbound calls, drop subscriptions.
    pub async fn close(self: &Arc<Self>) {
        self.session.begin_shutdown();
        self.cancellations.cancel_all();
        let pending: Vec<PendingCall> = {
            let mut map = self.pending.lock().expect("pending map poisoned");
            map.drain().map(|(_, call)| call).collect()
        };
        for call in pending {
            let _ = call
                .responder
                .send(Err(McpError::Cancelled("session closed".to_string())));
        }
        self.subscriptions.remove_session(self.session.id());
        if let Some(server) = self.server.upgrade() {
            server
                .connections
                .lock()
                .expect("connections poisoned")
                .remove(self.session.id());
            server
                .publish_session_event(topics::CLIENT_DISCONNECTED, self.session.id())
                .await;
        }
    }

    async fn publish_invocation(&self, topic: &str, name: &str, success: bool, duration_ms: u64) {
        if let Ok(subject) = self
            .bus
            .subject::<InvocationEvent>(topic, SubjectConfig::default())
        {
            let _ = subject
                .publish(InvocationEvent {
                    name: name.to_string(),
                    success,
                    duration_ms,
                })
                .await;
        }
    }

    async fn publish_request_failed(&self, method: &str, code: i32) {
        if let Ok(subject) = self
            .bus
            .subject::<crate::bus::events::RequestFailedEvent>(
                topics::REQUEST_FAILED,
                SubjectConfig::default(),
            )
        {
            let _ = subject
                .publish(crate::bus::events::RequestFailedEvent {
                    method: method.to_string(),
                    code,
                })
                .await;
        }
    }
}

/// Sink routing reporter output through the session gate with projection
struct SessionProgressSink {
    session: Arc<Session>,
}

impl ProgressSink for SessionProgressSink {
    fn send(&self, params: ProgressParams) -> McpResult<()> {
        let notification = projection::project_progress(&params, self.session.version())?;
        self.session.notify(notification);
        Ok(())
    }
}

fn error_message(
    id: RequestId,
    code: i32,
    message: impl Into<String>,
    data: Option<Value>,
) -> JsonRpcMessage {
    JsonRpcMessage::Error(JsonRpcError::error(id, code, message, data))
}

fn to_value<T: serde::Serialize>(value: T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(McpError::from)
}

/// Parse required params, mapping decode failures to `-32602`
fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.unwrap_or(Value::Null);
    serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
}

/// Parse optional params, defaulting when absent
fn parse_params_or_default<T: serde::de::DeserializeOwned + Default>(
    params: Option<Value>,
) -> McpResult<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| McpError::InvalidParams(e.to_string())),
    }
}
