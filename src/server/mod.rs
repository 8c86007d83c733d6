//! MCP server endpoint
//!
//! [`McpServer`] holds the shared registries; one [`ServerConnection`] per
//! transport connection drives the protocol engine and session machine.

pub mod cancellation;
pub mod engine;
pub mod registry;
pub mod sampling;
pub mod session;
pub mod subscriptions;

pub use engine::{McpServer, ServerConfig, ServerConnection};
pub use registry::{CompletionTarget, HandlerRegistry, ListKind, RegistrySnapshot};
pub use session::{Session, SessionState, SessionTransportData, LIST_CHANGED_DEBOUNCE};
pub use subscriptions::SubscriptionManager;
