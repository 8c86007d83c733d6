//! Tool abstraction
//!
//! Tools are functions clients invoke via `tools/call`. A registered tool
//! pairs its wire-visible [`ToolInfo`] with a handler and the schema binder
//! that validates invocation arguments.
//!
//! Tool-level failures follow the MCP convention: the handler returns
//! `Ok(ToolResult::error(..))` (or the engine wraps its `Err` the same way)
//! and the JSON-RPC response is *successful* with `isError: true`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::error::McpResult;
use crate::core::schema::{SchemaBinder, StaticSchemaBinder};
use crate::protocol::types::{ToolInfo, ToolResult};

/// Trait for implementing tool handlers
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with bound arguments
    async fn call(
        &self,
        arguments: HashMap<String, Value>,
        ctx: &RequestContext,
    ) -> McpResult<ToolResult>;
}

/// A registered tool
#[derive(Clone)]
pub struct ToolEntry {
    /// Wire-visible tool description
    pub info: ToolInfo,
    /// Handler implementing the tool
    pub handler: Arc<dyn ToolHandler>,
    /// Binder validating invocation arguments
    pub binder: Arc<dyn SchemaBinder>,
}

impl ToolEntry {
    /// Create a tool entry from a JSON-Schema object and handler
    pub fn new<H>(name: impl Into<String>, description: Option<String>, schema: Value, handler: H) -> Self
    where
        H: ToolHandler + 'static,
    {
        let binder = Arc::new(StaticSchemaBinder::new(schema));
        Self {
            info: ToolInfo {
                name: name.into(),
                description,
                input_schema: binder.describe(),
                annotations: None,
            },
            handler: Arc::new(handler),
            binder,
        }
    }

    /// Create a tool entry with a custom binder
    pub fn with_binder<H, B>(
        name: impl Into<String>,
        description: Option<String>,
        handler: H,
        binder: B,
    ) -> Self
    where
        H: ToolHandler + 'static,
        B: SchemaBinder + 'static,
    {
        let binder = Arc::new(binder);
        Self {
            info: ToolInfo {
                name: name.into(),
                description,
                input_schema: binder.describe(),
                annotations: None,
            },
            handler: Arc::new(handler),
            binder,
        }
    }

    /// Bind raw arguments and invoke the handler
    pub async fn call(&self, raw: Option<Value>, ctx: &RequestContext) -> McpResult<ToolResult> {
        let arguments = self.binder.bind(raw)?;
        self.handler.call(arguments, ctx).await
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.info.name)
            .finish_non_exhaustive()
    }
}
