//! Sub-process management for child MCP servers
//!
//! Configuration parsing with env placeholder substitution, the spawn/ready/
//! shutdown registry, and the child-side parent watchdog.

pub mod config;
pub mod registry;
pub mod watchdog;

pub use config::{ServerDefinition, ServersConfig, substitute_placeholders};
pub use registry::{ChildServerRegistry, ReadyState, RegistryConfig};
pub use watchdog::ParentWatchdog;
