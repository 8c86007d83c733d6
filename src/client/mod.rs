//! MCP client endpoint

pub mod mcp_client;
pub mod request_handler;

pub use mcp_client::{ClientConfig, McpClient};
pub use request_handler::{ClientRequestHandler, StaticClientRequestHandler};
