//! Server-initiated request handling on the client
//!
//! MCP is bidirectional: once connected, the server may ask the client for
//! its workspace roots (`roots/list`) or for an LLM generation
//! (`sampling/createMessage`). Applications implement
//! [`ClientRequestHandler`] to service those; [`StaticClientRequestHandler`]
//! covers the common case of fixed roots and no sampling.

use async_trait::async_trait;

use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::{CreateMessageParams, CreateMessageResult, ListRootsResult};
use crate::protocol::types::Root;

/// Handles server→client requests
#[async_trait]
pub trait ClientRequestHandler: Send + Sync {
    /// Service `roots/list`
    async fn list_roots(&self) -> McpResult<ListRootsResult>;

    /// Service `sampling/createMessage`
    async fn create_message(&self, params: CreateMessageParams) -> McpResult<CreateMessageResult>;

    /// Whether the client should advertise the `roots` capability
    fn advertises_roots(&self) -> bool {
        true
    }

    /// Whether the client should advertise the `sampling` capability
    fn advertises_sampling(&self) -> bool {
        false
    }
}

/// Handler with a fixed root set and no sampling support
pub struct StaticClientRequestHandler {
    roots: Vec<Root>,
}

impl StaticClientRequestHandler {
    /// Create a handler exposing no roots
    pub fn new() -> Self {
        Self { roots: Vec::new() }
    }

    /// Add a workspace root by file URI
    pub fn add_root(mut self, uri: impl Into<String>, name: Option<&str>) -> Self {
        self.roots.push(Root {
            uri: uri.into(),
            name: name.map(String::from),
        });
        self
    }
}

impl Default for StaticClientRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientRequestHandler for StaticClientRequestHandler {
    async fn list_roots(&self) -> McpResult<ListRootsResult> {
        Ok(ListRootsResult {
            roots: self.roots.clone(),
        })
    }

    async fn create_message(&self, _params: CreateMessageParams) -> McpResult<CreateMessageResult> {
        Err(McpError::MethodNotFound(
            "sampling is not supported by this client".to_string(),
        ))
    }

    fn advertises_roots(&self) -> bool {
        !self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_handler_roots() {
        let handler = StaticClientRequestHandler::new()
            .add_root("file:///home/user/project", Some("project"));
        assert!(handler.advertises_roots());
        assert!(!handler.advertises_sampling());
        let result = handler.list_roots().await.unwrap();
        assert_eq!(result.roots.len(), 1);
        assert_eq!(result.roots[0].uri, "file:///home/user/project");
    }

    #[tokio::test]
    async fn test_static_handler_rejects_sampling() {
        let handler = StaticClientRequestHandler::new();
        assert!(!handler.advertises_roots());
        let err = handler
            .create_message(CreateMessageParams {
                messages: vec![],
                model_preferences: None,
                system_prompt: None,
                max_tokens: None,
                streaming: None,
                chunk_size: None,
                meta: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::MethodNotFound(_)));
    }
}
