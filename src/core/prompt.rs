//! Prompt abstraction
//!
//! Prompts are named templates rendered via `prompts/get` with string
//! arguments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::error::McpResult;
use crate::protocol::messages::GetPromptResult;
use crate::protocol::types::{PromptArgument, PromptInfo};

/// Trait for implementing prompt handlers
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Render the prompt with the supplied arguments
    async fn render(
        &self,
        arguments: HashMap<String, String>,
        ctx: &RequestContext,
    ) -> McpResult<GetPromptResult>;
}

/// A registered prompt
#[derive(Clone)]
pub struct PromptEntry {
    /// Wire-visible prompt description
    pub info: PromptInfo,
    /// Handler implementing the render
    pub handler: Arc<dyn PromptHandler>,
}

impl PromptEntry {
    /// Create a prompt entry
    pub fn new<H>(
        name: impl Into<String>,
        description: Option<String>,
        arguments: Option<Vec<PromptArgument>>,
        handler: H,
    ) -> Self
    where
        H: PromptHandler + 'static,
    {
        Self {
            info: PromptInfo {
                name: name.into(),
                description,
                arguments,
            },
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for PromptEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEntry")
            .field("name", &self.info.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{ContentBlock, PromptMessage, Role};
    use serde_json::json;

    struct Greeter;

    #[async_trait]
    impl PromptHandler for Greeter {
        async fn render(
            &self,
            arguments: HashMap<String, String>,
            _ctx: &RequestContext,
        ) -> McpResult<GetPromptResult> {
            let name = arguments.get("name").cloned().unwrap_or_default();
            Ok(GetPromptResult {
                description: None,
                messages: vec![PromptMessage {
                    role: Role::User,
                    content: ContentBlock::text(format!("Greet {name}")),
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_prompt_render() {
        let entry = PromptEntry::new("greet", None, None, Greeter);
        let ctx = RequestContext::new(json!(1));
        let mut args = HashMap::new();
        args.insert("name".to_string(), "Ada".to_string());
        let result = entry.handler.render(args, &ctx).await.unwrap();
        assert_eq!(result.messages.len(), 1);
    }
}
