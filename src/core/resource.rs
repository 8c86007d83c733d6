//! Resource abstraction
//!
//! Resources are addressable by concrete URI or by URI template. Template
//! matches bind captured segments into the parameter map handed to the
//! handler.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{ResourceContents, ResourceInfo, ResourceTemplateInfo};
use crate::utils::UriTemplate;

/// Trait for implementing resource handlers
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`. `params` holds template captures (empty
    /// for exact-URI entries).
    async fn read(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
        ctx: &RequestContext,
    ) -> McpResult<Vec<ResourceContents>>;
}

/// A registered exact-URI resource
#[derive(Clone)]
pub struct ResourceEntry {
    /// Wire-visible resource description
    pub info: ResourceInfo,
    /// Handler implementing the read
    pub handler: Arc<dyn ResourceHandler>,
}

impl ResourceEntry {
    /// Create an exact-URI resource entry
    pub fn new<H>(uri: impl Into<String>, name: impl Into<String>, handler: H) -> Self
    where
        H: ResourceHandler + 'static,
    {
        Self {
            info: ResourceInfo {
                uri: uri.into(),
                name: name.into(),
                description: None,
                mime_type: None,
                annotations: None,
            },
            handler: Arc::new(handler),
        }
    }

    /// Create an entry from a full info record
    pub fn from_info<H>(info: ResourceInfo, handler: H) -> Self
    where
        H: ResourceHandler + 'static,
    {
        Self {
            info,
            handler: Arc::new(handler),
        }
    }
}

/// A registered templated resource
#[derive(Clone)]
pub struct ResourceTemplateEntry {
    /// Wire-visible template description
    pub info: ResourceTemplateInfo,
    /// Parsed template used for matching
    pub template: UriTemplate,
    /// Handler implementing the read
    pub handler: Arc<dyn ResourceHandler>,
}

impl ResourceTemplateEntry {
    /// Create a templated resource entry. Fails if the template does not
    /// parse or contains no placeholders (use [`ResourceEntry`] for exact
    /// URIs).
    pub fn new<H>(
        uri_template: impl Into<String>,
        name: impl Into<String>,
        handler: H,
    ) -> McpResult<Self>
    where
        H: ResourceHandler + 'static,
    {
        let raw = uri_template.into();
        let template = UriTemplate::parse(&raw)?;
        if template.is_exact() {
            return Err(McpError::InvalidUri(format!(
                "template '{raw}' has no placeholders; register it as an exact resource"
            )));
        }
        Ok(Self {
            info: ResourceTemplateInfo {
                uri_template: raw,
                name: name.into(),
                description: None,
                mime_type: None,
            },
            template,
            handler: Arc::new(handler),
        })
    }
}

impl std::fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("uri", &self.info.uri)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ResourceTemplateEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTemplateEntry")
            .field("uri_template", &self.info.uri_template)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Static(&'static str);

    #[async_trait]
    impl ResourceHandler for Static {
        async fn read(
            &self,
            uri: &str,
            _params: &HashMap<String, String>,
            _ctx: &RequestContext,
        ) -> McpResult<Vec<ResourceContents>> {
            Ok(vec![ResourceContents::Text {
                uri: uri.to_string(),
                mime_type: Some("text/plain".to_string()),
                text: self.0.to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn test_exact_entry_reads() {
        let entry = ResourceEntry::new("mem://greeting", "greeting", Static("hello"));
        let ctx = RequestContext::new(json!(1));
        let contents = entry
            .handler
            .read("mem://greeting", &HashMap::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn test_template_entry_rejects_exact() {
        assert!(ResourceTemplateEntry::new("mem://fixed", "fixed", Static("x")).is_err());
        assert!(ResourceTemplateEntry::new("mem://{key}", "keyed", Static("x")).is_ok());
    }
}
