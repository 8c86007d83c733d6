//! Core abstractions: errors, handler traits, and the schema binder seam

pub mod completion;
pub mod context;
pub mod error;
pub mod prompt;
pub mod resource;
pub mod schema;
pub mod tool;

pub use context::RequestContext;
pub use error::{McpError, McpResult, ProgressError};
pub use schema::{SchemaBinder, StaticSchemaBinder};
