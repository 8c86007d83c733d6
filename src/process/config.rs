//! Child-server configuration
//!
//! A JSON document of the shape used by MCP hosts:
//!
//! ```json
//! { "mcpServers": {
//!     "files": {
//!       "command": "mcp-files",
//!       "args": ["--readonly"],
//!       "env": {"HOME_DIR": "${HOME}"},
//!       "workingDirectory": "/srv"
//!     }
//! }}
//! ```
//!
//! `${NAME}` placeholders in the env map are substituted from the parent
//! process environment; absent variables become empty strings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::error::{McpError, McpResult};

/// Definition of one child MCP server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerDefinition {
    /// Executable to launch
    pub command: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overlay; values may contain `${NAME}` placeholders
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child
    #[serde(rename = "workingDirectory", skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

/// Top-level child-server configuration document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServersConfig {
    /// Children keyed by name
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, ServerDefinition>,
}

impl ServersConfig {
    /// Parse a configuration document from JSON text
    pub fn from_json(text: &str) -> McpResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| McpError::Validation(format!("invalid server config: {e}")))
    }
}

/// Substitute `${NAME}` placeholders using `lookup`; absent names become
/// empty strings.
pub fn substitute_placeholders<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut name = String::new();
            let mut closed = false;
            for inner in chars.by_ref() {
                if inner == '}' {
                    closed = true;
                    break;
                }
                name.push(inner);
            }
            if closed {
                out.push_str(&lookup(&name).unwrap_or_default());
            } else {
                // Unterminated placeholder is kept literally.
                out.push_str("${");
                out.push_str(&name);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl ServerDefinition {
    /// The env map with placeholders substituted from the parent process env
    pub fn resolved_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    substitute_placeholders(v, |name| std::env::var(name).ok()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_document() {
        let config = ServersConfig::from_json(
            r#"{
                "mcpServers": {
                    "files": {
                        "command": "mcp-files",
                        "args": ["--readonly"],
                        "env": {"ROOT": "${HOME}"},
                        "workingDirectory": "/srv"
                    },
                    "bare": {"command": "mcp-bare"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.mcp_servers.len(), 2);
        let files = &config.mcp_servers["files"];
        assert_eq!(files.args, vec!["--readonly".to_string()]);
        assert_eq!(files.working_directory.as_deref(), Some("/srv"));
        assert!(config.mcp_servers["bare"].args.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(ServersConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_substitution() {
        let lookup = |name: &str| match name {
            "HOME" => Some("/home/user".to_string()),
            _ => None,
        };
        assert_eq!(
            substitute_placeholders("${HOME}/bin", lookup),
            "/home/user/bin"
        );
        // Absent variables become empty strings.
        assert_eq!(substitute_placeholders("x=${MISSING}!", lookup), "x=!");
        // Multiple placeholders.
        assert_eq!(
            substitute_placeholders("${HOME}:${HOME}", lookup),
            "/home/user:/home/user"
        );
        // Plain strings pass through.
        assert_eq!(substitute_placeholders("no vars", lookup), "no vars");
        // Unterminated placeholder kept literally.
        assert_eq!(substitute_placeholders("${OOPS", lookup), "${OOPS");
    }
}
