// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! # spectra-mcp-rs
//!
//! A multi-revision Rust library for the
//! [Model Context Protocol (MCP)](https://modelcontextprotocol.io/),
//! providing both server and client endpoints across the `2024-11-05`,
//! `2025-03-26`, and `draft` protocol revisions with automatic version
//! negotiation.
//!
//! ## What's inside
//!
//! - **Protocol engine**: JSON-RPC envelope/batch handling, request
//!   correlation, dispatch, and the initialize handshake with capability
//!   gating
//! - **Version-adaptive projection**: one canonical in-memory model, shaped
//!   per negotiated revision at encode time
//! - **Event bus**: typed pub/sub with replay buffers decoupling
//!   registration/invocation events from I/O
//! - **Progress subsystem**: strictly-increasing tokens, per-token rate
//!   limiting with overflow strategies, flat and hierarchical reporters
//! - **Sub-process registry**: child MCP servers with process-group
//!   isolation, readiness probing, and escalating shutdown
//!
//! ## Server example
//!
//! ```rust,no_run
//! use spectra_mcp_rs::prelude::*;
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl ToolHandler for EchoHandler {
//!     async fn call(
//!         &self,
//!         arguments: HashMap<String, Value>,
//!         _ctx: &RequestContext,
//!     ) -> McpResult<ToolResult> {
//!         let message = arguments
//!             .get("message")
//!             .and_then(Value::as_str)
//!             .unwrap_or("Hello, World!");
//!         Ok(ToolResult::text(message))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let server = McpServer::new("echo-server", "1.0.0");
//!     server
//!         .add_tool(
//!             "echo",
//!             Some("Echo a message".to_string()),
//!             json!({
//!                 "type": "object",
//!                 "properties": { "message": { "type": "string" } },
//!                 "required": ["message"]
//!             }),
//!             EchoHandler,
//!         )
//!         .await?;
//!     // Wire a connection to a transport; see `server::McpServer::connect`.
//!     Ok(())
//! }
//! ```
//!
//! ## Module organization
//!
//! - [`core`]: errors, handler traits, request context, SchemaBinder seam
//! - [`protocol`]: wire types, codec, method constants, version projection
//! - [`bus`]: typed publish/subscribe event bus
//! - [`progress`]: token manager, rate limiter, reporters
//! - [`server`]: server endpoint (engine, session machine, registries)
//! - [`client`]: client endpoint and server-request handling
//! - [`transport`]: the framing-neutral transport seam (+ stdio)
//! - [`process`]: child MCP server lifecycle management
//! - [`utils`]: URI template matching

pub mod bus;
pub mod client;
pub mod core;
#[cfg(feature = "stdio")]
pub mod process;
pub mod progress;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::core::error::{McpError, McpResult, ProgressError};
pub use crate::protocol::types::*;
pub use crate::protocol::version::ProtocolVersion;

/// Prelude module for convenient imports
pub mod prelude {
    // Core types and traits
    pub use crate::core::{
        RequestContext,
        completion::CompletionHandler,
        error::{McpError, McpResult, ProgressError},
        prompt::PromptHandler,
        resource::ResourceHandler,
        schema::{SchemaBinder, StaticSchemaBinder},
        tool::ToolHandler,
    };

    // Protocol types and messages
    pub use crate::protocol::messages::*;
    pub use crate::protocol::types::*;
    pub use crate::protocol::version::ProtocolVersion;

    // Endpoints
    pub use crate::client::{ClientRequestHandler, McpClient, StaticClientRequestHandler};
    pub use crate::server::{McpServer, ServerConnection, SessionTransportData};

    // Progress
    pub use crate::progress::{ProgressReporter, ProgressSink, ProgressTokenManager};

    // Transports
    pub use crate::transport::Transport;
    #[cfg(feature = "stdio")]
    pub use crate::transport::{StdioClientTransport, StdioServerTransport};

    // Sub-process management
    #[cfg(feature = "stdio")]
    pub use crate::process::{ChildServerRegistry, ServersConfig};

    // Essential external types
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::collections::HashMap;
}
