//! MCP protocol layer
//!
//! Wire types, method constants, the JSON-RPC codec, and the
//! version-adaptive projector.

pub mod codec;
pub mod messages;
pub mod methods;
pub mod projection;
pub mod types;
pub mod version;
