//! URI template parsing and matching
//!
//! Templates contain literal segments and `{name}` / `{name*}` placeholders.
//! A plain placeholder captures up to the next literal character, never
//! crossing `/`; the starred form captures greedily, `/` included. Matching
//! precedence lives in the handler registry: exact entries first, then
//! templates by descending literal-character count.

use std::collections::HashMap;

use crate::core::error::{McpError, McpResult};

/// A parsed URI template
#[derive(Debug, Clone, PartialEq)]
pub struct UriTemplate {
    raw: String,
    parts: Vec<Part>,
    literal_chars: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    /// `{name}`: captures within one path segment
    Single(String),
    /// `{name*}`: captures greedily, including `/`
    Greedy(String),
}

impl UriTemplate {
    /// Parse a template string.
    ///
    /// Errors on unbalanced braces, empty placeholder names, and adjacent
    /// placeholders with no separating literal (the match would be
    /// ambiguous).
    pub fn parse(template: &str) -> McpResult<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut literal_chars = 0usize;
        let mut chars = template.chars().peekable();
        let mut last_was_placeholder = false;

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if last_was_placeholder {
                        return Err(McpError::InvalidUri(format!(
                            "adjacent placeholders in template '{template}'"
                        )));
                    }
                    if !literal.is_empty() {
                        literal_chars += literal.len();
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    let mut name = String::new();
                    let mut greedy = false;
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '*' => greedy = true,
                            _ => name.push(inner),
                        }
                    }
                    if !closed {
                        return Err(McpError::InvalidUri(format!(
                            "unbalanced brace in template '{template}'"
                        )));
                    }
                    if name.is_empty() {
                        return Err(McpError::InvalidUri(format!(
                            "empty placeholder name in template '{template}'"
                        )));
                    }
                    parts.push(if greedy {
                        Part::Greedy(name)
                    } else {
                        Part::Single(name)
                    });
                    last_was_placeholder = true;
                }
                '}' => {
                    return Err(McpError::InvalidUri(format!(
                        "unbalanced brace in template '{template}'"
                    )));
                }
                _ => {
                    literal.push(c);
                    last_was_placeholder = false;
                }
            }
        }
        if !literal.is_empty() {
            literal_chars += literal.len();
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            raw: template.to_string(),
            parts,
            literal_chars,
        })
    }

    /// The original template string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of literal (non-placeholder) characters; the registry orders
    /// templates by this, descending.
    pub fn literal_chars(&self) -> usize {
        self.literal_chars
    }

    /// Whether the template contains no placeholders at all
    pub fn is_exact(&self) -> bool {
        self.parts
            .iter()
            .all(|p| matches!(p, Part::Literal(_)))
    }

    /// Match a concrete URI against this template, binding placeholder names
    /// to the captured substrings. Returns `None` when the literals do not
    /// align.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut captures = HashMap::new();
        if match_parts(&self.parts, uri, &mut captures) {
            Some(captures)
        } else {
            None
        }
    }
}

fn match_parts(parts: &[Part], input: &str, captures: &mut HashMap<String, String>) -> bool {
    match parts.split_first() {
        None => input.is_empty(),
        Some((Part::Literal(lit), rest)) => input
            .strip_prefix(lit.as_str())
            .is_some_and(|remaining| match_parts(rest, remaining, captures)),
        Some((Part::Single(name), rest)) => {
            // Captures must be non-empty and stop at '/'; try the longest
            // candidate first so trailing literals bind naturally.
            let segment_end = input.find('/').unwrap_or(input.len());
            for end in (1..=segment_end).rev() {
                if !input.is_char_boundary(end) {
                    continue;
                }
                captures.insert(name.clone(), input[..end].to_string());
                if match_parts(rest, &input[end..], captures) {
                    return true;
                }
            }
            captures.remove(name);
            false
        }
        Some((Part::Greedy(name), rest)) => {
            for end in (1..=input.len()).rev() {
                if !input.is_char_boundary(end) {
                    continue;
                }
                captures.insert(name.clone(), input[..end].to_string());
                if match_parts(rest, &input[end..], captures) {
                    return true;
                }
            }
            captures.remove(name);
            false
        }
    }
}
