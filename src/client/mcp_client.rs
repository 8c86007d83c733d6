//! MCP client implementation
//!
//! The client drives the initialize handshake, correlates its outbound
//! requests, services server-initiated requests through the installed
//! [`ClientRequestHandler`], and exposes typed convenience calls for every
//! client→server method.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use crate::client::request_handler::{ClientRequestHandler, StaticClientRequestHandler};
use crate::core::error::{McpError, McpResult};
use crate::protocol::codec::{self, Decoded, Envelope};
use crate::protocol::messages::*;
use crate::protocol::methods;
use crate::protocol::types::*;
use crate::protocol::version::ProtocolVersion;
use crate::transport::traits::Transport;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for client→server requests
    pub request_timeout: Duration,
    /// Protocol revision requested at initialize
    pub requested_version: ProtocolVersion,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            requested_version: ProtocolVersion::latest(),
        }
    }
}

struct ClientRouter {
    pending: std::sync::Mutex<HashMap<i64, oneshot::Sender<McpResult<Value>>>>,
    handler: Arc<dyn ClientRequestHandler>,
    notification_tx: mpsc::UnboundedSender<JsonRpcNotification>,
}

impl ClientRouter {
    async fn route_frame(self: &Arc<Self>, bytes: Vec<u8>) -> Option<Vec<u8>> {
        match codec::decode_message(&bytes) {
            Decoded::Reject(err) => codec::encode_error(&err).ok(),
            Decoded::Single(envelope) => match self.route_envelope(envelope).await {
                Some(value) => serde_json::to_vec(&value).ok(),
                None => None,
            },
            Decoded::Batch(envelopes) => {
                let mut responses = Vec::new();
                for envelope in envelopes {
                    if let Some(value) = self.route_envelope(envelope).await {
                        responses.push(value);
                    }
                }
                codec::encode_batch(&responses).ok().flatten()
            }
        }
    }

    async fn route_envelope(self: &Arc<Self>, envelope: Envelope) -> Option<Value> {
        match envelope {
            Envelope::Invalid(err) => serde_json::to_value(&err).ok(),
            Envelope::Response(resp) => {
                self.resolve(resp.id, Ok(resp.result));
                None
            }
            Envelope::Error(err) => {
                let id = err.id.clone();
                self.resolve(
                    id,
                    Err(McpError::Protocol(format!(
                        "server error {}: {}",
                        err.error.code, err.error.message
                    ))),
                );
                None
            }
            Envelope::Notification(n) => {
                if self.notification_tx.send(n).is_err() {
                    debug!("notification receiver dropped");
                }
                None
            }
            Envelope::Request(req) => {
                let response = self.serve_request(req).await;
                serde_json::to_value(&response).ok()
            }
        }
    }

    async fn serve_request(&self, req: JsonRpcRequest) -> JsonRpcMessage {
        let id = req.id.clone();
        let outcome: McpResult<Value> = match req.method.as_str() {
            methods::PING => serde_json::to_value(EmptyResult {}).map_err(McpError::from),
            methods::ROOTS_LIST => match self.handler.list_roots().await {
                Ok(result) => serde_json::to_value(result).map_err(McpError::from),
                Err(e) => Err(e),
            },
            methods::SAMPLING_CREATE_MESSAGE => {
                let params: McpResult<CreateMessageParams> = req
                    .params
                    .clone()
                    .map(|p| {
                        serde_json::from_value(p)
                            .map_err(|e| McpError::InvalidParams(e.to_string()))
                    })
                    .unwrap_or_else(|| Err(McpError::InvalidParams("missing params".to_string())));
                match params {
                    Ok(params) => match self.handler.create_message(params).await {
                        Ok(result) => serde_json::to_value(result).map_err(McpError::from),
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                }
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        match outcome {
            Ok(result) => match JsonRpcResponse::success(id.clone(), result) {
                Ok(resp) => JsonRpcMessage::Response(resp),
                Err(e) => JsonRpcMessage::Error(JsonRpcError::error(
                    id,
                    error_codes::INTERNAL_ERROR,
                    e.to_string(),
                    None,
                )),
            },
            Err(err) => JsonRpcMessage::Error(JsonRpcError::error(
                id,
                err.jsonrpc_code(),
                err.to_string(),
                None,
            )),
        }
    }

    fn resolve(&self, id: RequestId, result: McpResult<Value>) {
        let Some(id) = id.as_i64() else {
            warn!(id = %id, "response with non-integer id dropped");
            return;
        };
        match self.pending.lock().expect("pending poisoned").remove(&id) {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!(id, "late response dropped"),
        }
    }
}

/// MCP client endpoint
pub struct McpClient {
    info: ClientInfo,
    config: ClientConfig,
    handler: Arc<dyn ClientRequestHandler>,
    transport: Mutex<Option<Box<dyn Transport>>>,
    router: Arc<ClientRouter>,
    notification_rx: Mutex<Option<mpsc::UnboundedReceiver<JsonRpcNotification>>>,
    server_info: RwLock<Option<ServerInfo>>,
    server_capabilities: RwLock<Option<ServerCapabilities>>,
    negotiated_version: RwLock<Option<ProtocolVersion>>,
    next_id: AtomicI64,
    connected: RwLock<bool>,
}

impl McpClient {
    /// Create a client with the default handler (no roots, no sampling)
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_handler(name, version, StaticClientRequestHandler::new())
    }

    /// Create a client with a custom server-request handler
    pub fn with_handler<H>(name: impl Into<String>, version: impl Into<String>, handler: H) -> Self
    where
        H: ClientRequestHandler + 'static,
    {
        let handler: Arc<dyn ClientRequestHandler> = Arc::new(handler);
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        Self {
            info: Implementation::new(name.into(), version.into()),
            config: ClientConfig::default(),
            handler: handler.clone(),
            transport: Mutex::new(None),
            router: Arc::new(ClientRouter {
                pending: std::sync::Mutex::new(HashMap::new()),
                handler,
                notification_tx,
            }),
            notification_rx: Mutex::new(Some(notification_rx)),
            server_info: RwLock::new(None),
            server_capabilities: RwLock::new(None),
            negotiated_version: RwLock::new(None),
            next_id: AtomicI64::new(1),
            connected: RwLock::new(false),
        }
    }

    /// Replace the configuration (before `connect`)
    pub fn set_config(&mut self, config: ClientConfig) {
        self.config = config;
    }

    /// Client identity
    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    /// Server identity, once connected
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    /// Server capabilities, once connected
    pub async fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.server_capabilities.read().await.clone()
    }

    /// Negotiated protocol revision, once connected
    pub async fn negotiated_version(&self) -> Option<ProtocolVersion> {
        *self.negotiated_version.read().await
    }

    /// Whether the handshake completed
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Take the stream of server notifications (progress, list_changed,
    /// resource updates, log messages). Can be taken once.
    pub async fn notifications(&self) -> Option<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        self.notification_rx.lock().await.take()
    }

    /// Connect over `transport` and run the initialize handshake
    pub async fn connect<T>(&self, mut transport: T) -> McpResult<InitializeResult>
    where
        T: Transport + 'static,
    {
        let router = self.router.clone();
        transport.on_receive(Arc::new(move |bytes| {
            let router = router.clone();
            Box::pin(async move { router.route_frame(bytes).await })
        }));
        transport.init().await?;
        transport.start().await?;
        *self.transport.lock().await = Some(Box::new(transport));

        let result = self.initialize().await?;
        *self.connected.write().await = true;
        Ok(result)
    }

    async fn initialize(&self) -> McpResult<InitializeResult> {
        let capabilities = ClientCapabilities {
            roots: self.handler.advertises_roots().then(Default::default),
            sampling: self.handler.advertises_sampling().then(Default::default),
            experimental: None,
            extra: HashMap::new(),
        };
        let params = InitializeParams {
            protocol_version: self.config.requested_version.to_string(),
            capabilities,
            client_info: self.info.clone(),
            meta: None,
        };

        let value = self.request(methods::INITIALIZE, Some(params)).await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("malformed initialize result: {e}")))?;

        let negotiated: ProtocolVersion = result.protocol_version.parse()?;
        *self.negotiated_version.write().await = Some(negotiated);
        *self.server_info.write().await = Some(result.server_info.clone());
        *self.server_capabilities.write().await = Some(result.capabilities.clone());

        // Second leg of the handshake unlocks the server's notifications.
        self.notify(methods::INITIALIZED, None::<()>).await?;
        Ok(result)
    }

    /// Disconnect, failing any in-flight requests
    pub async fn disconnect(&self) -> McpResult<()> {
        *self.connected.write().await = false;
        if let Some(mut transport) = self.transport.lock().await.take() {
            transport.stop().await?;
        }
        let pending: Vec<oneshot::Sender<McpResult<Value>>> = {
            let mut map = self.router.pending.lock().expect("pending poisoned");
            map.drain().map(|(_, tx)| tx).collect()
        };
        for tx in pending {
            let _ = tx.send(Err(McpError::Cancelled("client disconnected".to_string())));
        }
        *self.server_info.write().await = None;
        *self.server_capabilities.write().await = None;
        *self.negotiated_version.write().await = None;
        Ok(())
    }

    // ========================================================================
    // Raw request/notification plumbing
    // ========================================================================

    /// Send a request and await its response
    pub async fn request<P: serde::Serialize>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> McpResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(json!(id), method, params)?;
        let bytes = serde_json::to_vec(&request)?;

        let (tx, rx) = oneshot::channel();
        self.router
            .pending
            .lock()
            .expect("pending poisoned")
            .insert(id, tx);

        if let Err(e) = self.send_frame(&bytes).await {
            self.router
                .pending
                .lock()
                .expect("pending poisoned")
                .remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Cancelled(format!(
                "pending call for '{method}' dropped"
            ))),
            Err(_) => {
                self.router
                    .pending
                    .lock()
                    .expect("pending poisoned")
                    .remove(&id);
                // Tell the server we are no longer waiting.
                let _ = self
                    .notify(
                        methods::CANCELLED,
                        Some(CancelledParams {
                            request_id: json!(id),
                            reason: Some("deadline exceeded".to_string()),
                        }),
                    )
                    .await;
                Err(McpError::Cancelled(format!(
                    "request '{method}' timed out after {:?}",
                    self.config.request_timeout
                )))
            }
        }
    }

    /// Send a notification
    pub async fn notify<P: serde::Serialize>(&self, method: &str, params: Option<P>) -> McpResult<()> {
        let notification = JsonRpcNotification::new(method, params)?;
        let bytes = codec::encode_notification(&notification)?;
        self.send_frame(&bytes).await
    }

    async fn send_frame(&self, bytes: &[u8]) -> McpResult<()> {
        let transport = self.transport.lock().await;
        match transport.as_ref() {
            Some(t) => t.send(bytes).await,
            None => Err(McpError::connection("not connected")),
        }
    }

    // ========================================================================
    // Typed convenience calls
    // ========================================================================

    /// `ping`
    pub async fn ping(&self) -> McpResult<()> {
        self.request(methods::PING, None::<PingParams>).await?;
        Ok(())
    }

    /// `tools/list`
    pub async fn list_tools(&self) -> McpResult<ListToolsResult> {
        let value = self.request(methods::TOOLS_LIST, None::<ListParams>).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `tools/call`
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, Value>>,
    ) -> McpResult<ToolResult> {
        let value = self
            .request(
                methods::TOOLS_CALL,
                Some(CallToolParams {
                    name: name.into(),
                    arguments,
                    meta: None,
                }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/list`
    pub async fn list_resources(&self) -> McpResult<ListResourcesResult> {
        let value = self
            .request(methods::RESOURCES_LIST, None::<ListParams>)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/templates/list`
    pub async fn list_resource_templates(&self) -> McpResult<ListResourceTemplatesResult> {
        let value = self
            .request(methods::RESOURCES_TEMPLATES_LIST, None::<ListParams>)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/read`
    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResult> {
        let value = self
            .request(
                methods::RESOURCES_READ,
                Some(ReadResourceParams {
                    uri: uri.into(),
                    meta: None,
                }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `resources/subscribe`
    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        self.request(
            methods::RESOURCES_SUBSCRIBE,
            Some(SubscribeResourceParams {
                uri: uri.into(),
                meta: None,
            }),
        )
        .await?;
        Ok(())
    }

    /// `resources/unsubscribe`
    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        self.request(
            methods::RESOURCES_UNSUBSCRIBE,
            Some(SubscribeResourceParams {
                uri: uri.into(),
                meta: None,
            }),
        )
        .await?;
        Ok(())
    }

    /// `prompts/list`
    pub async fn list_prompts(&self) -> McpResult<ListPromptsResult> {
        let value = self
            .request(methods::PROMPTS_LIST, None::<ListParams>)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `prompts/get`
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        let value = self
            .request(
                methods::PROMPTS_GET,
                Some(GetPromptParams {
                    name: name.into(),
                    arguments,
                    meta: None,
                }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `completion/complete`
    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument: CompletionArgument,
    ) -> McpResult<CompleteResult> {
        let value = self
            .request(
                methods::COMPLETION_COMPLETE,
                Some(CompleteParams {
                    reference,
                    argument,
                    meta: None,
                }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `logging/setLevel`
    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<()> {
        self.request(
            methods::LOGGING_SET_LEVEL,
            Some(SetLoggingLevelParams { level, meta: None }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_router_resolves_pending() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = Arc::new(ClientRouter {
            pending: std::sync::Mutex::new(HashMap::new()),
            handler: Arc::new(StaticClientRequestHandler::new()),
            notification_tx: tx,
        });
        let (otx, orx) = oneshot::channel();
        router.pending.lock().unwrap().insert(5, otx);

        let frame = serde_json::to_vec(&json!({"jsonrpc":"2.0","id":5,"result":{"ok":true}}))
            .unwrap();
        assert!(router.route_frame(frame).await.is_none());
        let result = orx.await.unwrap().unwrap();
        assert_eq!(result["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_router_serves_ping() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = Arc::new(ClientRouter {
            pending: std::sync::Mutex::new(HashMap::new()),
            handler: Arc::new(StaticClientRequestHandler::new()),
            notification_tx: tx,
        });
        let frame =
            serde_json::to_vec(&json!({"jsonrpc":"2.0","id":"p1","method":"ping"})).unwrap();
        let response = router.route_frame(frame).await.unwrap();
        let v: Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(v["id"], json!("p1"));
        assert_eq!(v["result"], json!({}));
    }

    #[tokio::test]
    async fn test_router_serves_roots_list() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = Arc::new(ClientRouter {
            pending: std::sync::Mutex::new(HashMap::new()),
            handler: Arc::new(
                StaticClientRequestHandler::new().add_root("file:///workspace", None),
            ),
            notification_tx: tx,
        });
        let frame =
            serde_json::to_vec(&json!({"jsonrpc":"2.0","id":1,"method":"roots/list"})).unwrap();
        let response = router.route_frame(frame).await.unwrap();
        let v: Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(v["result"]["roots"][0]["uri"], json!("file:///workspace"));
    }

    #[tokio::test]
    async fn test_router_forwards_notifications() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = Arc::new(ClientRouter {
            pending: std::sync::Mutex::new(HashMap::new()),
            handler: Arc::new(StaticClientRequestHandler::new()),
            notification_tx: tx,
        });
        let frame = serde_json::to_vec(
            &json!({"jsonrpc":"2.0","method":"notifications/tools/list_changed"}),
        )
        .unwrap();
        assert!(router.route_frame(frame).await.is_none());
        let n = rx.recv().await.unwrap();
        assert_eq!(n.method, "notifications/tools/list_changed");
    }

    #[tokio::test]
    async fn test_router_unknown_method_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = Arc::new(ClientRouter {
            pending: std::sync::Mutex::new(HashMap::new()),
            handler: Arc::new(StaticClientRequestHandler::new()),
            notification_tx: tx,
        });
        let frame =
            serde_json::to_vec(&json!({"jsonrpc":"2.0","id":2,"method":"bogus/method"})).unwrap();
        let response = router.route_frame(frame).await.unwrap();
        let v: Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(v["error"]["code"], json!(error_codes::METHOD_NOT_FOUND));
    }
}
