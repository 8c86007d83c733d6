//! Version-adaptive projection
//!
//! The engine keeps one canonical in-memory representation of every
//! request/response/notification and calls into this module at encode time
//! to shape it for the negotiated revision. Projection is a pure function of
//! `(canonical value, version)`; validation of version-dependent fields
//! happens here rather than at parse time, so a 2024-11-05 session can still
//! *carry* a progress message internally while never emitting it.

use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::{
    CreateMessageParams, CreateMessageResult, GetPromptResult, ProgressParams,
};
use crate::protocol::types::{ContentBlock, JsonRpcNotification, ToolResult};
use crate::protocol::version::ProtocolVersion;
use crate::protocol::methods;

/// Project a progress notification for the wire.
///
/// The `message` field is suppressed for 2024-11-05; everything else passes
/// through untouched.
pub fn project_progress(
    params: &ProgressParams,
    version: ProtocolVersion,
) -> McpResult<JsonRpcNotification> {
    let mut projected = params.clone();
    if !version.supports_progress_message() {
        projected.message = None;
    }
    JsonRpcNotification::new(methods::PROGRESS, Some(projected)).map_err(McpError::from)
}

/// Project a single content block, rejecting modalities the revision lacks.
pub fn project_content(block: &ContentBlock, version: ProtocolVersion) -> McpResult<ContentBlock> {
    if block.is_audio() && !version.supports_audio() {
        return Err(McpError::Validation(format!(
            "audio content requires protocol version 2025-03-26 or later, session is {version}"
        )));
    }
    Ok(block.clone())
}

/// Project a tool result for the wire.
pub fn project_tool_result(result: &ToolResult, version: ProtocolVersion) -> McpResult<ToolResult> {
    let content = result
        .content
        .iter()
        .map(|block| project_content(block, version))
        .collect::<McpResult<Vec<_>>>()?;
    Ok(ToolResult {
        content,
        is_error: result.is_error,
    })
}

/// Project a rendered prompt for the wire.
pub fn project_prompt_result(
    result: &GetPromptResult,
    version: ProtocolVersion,
) -> McpResult<GetPromptResult> {
    let messages = result
        .messages
        .iter()
        .map(|m| {
            project_content(&m.content, version).map(|content| crate::protocol::types::PromptMessage {
                role: m.role,
                content,
            })
        })
        .collect::<McpResult<Vec<_>>>()?;
    Ok(GetPromptResult {
        description: result.description.clone(),
        messages,
    })
}

/// Project sampling request params, gating streaming and audio.
pub fn project_sampling_params(
    params: &CreateMessageParams,
    version: ProtocolVersion,
) -> McpResult<CreateMessageParams> {
    if params.streaming == Some(true) && !version.supports_sampling_streaming() {
        return Err(McpError::Validation(format!(
            "sampling streaming requires protocol version 2025-03-26 or later, session is {version}"
        )));
    }
    let messages = params
        .messages
        .iter()
        .map(|m| {
            project_content(&m.content, version).map(|content| {
                crate::protocol::types::SamplingMessage {
                    role: m.role,
                    content,
                }
            })
        })
        .collect::<McpResult<Vec<_>>>()?;
    Ok(CreateMessageParams {
        messages,
        ..params.clone()
    })
}

/// Project a sampling result, gating audio content.
pub fn project_sampling_result(
    result: &CreateMessageResult,
    version: ProtocolVersion,
) -> McpResult<CreateMessageResult> {
    let content = project_content(&result.content, version)?;
    Ok(CreateMessageResult {
        content,
        ..result.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Role, SamplingMessage};
    use serde_json::json;

    fn progress(message: Option<&str>) -> ProgressParams {
        ProgressParams {
            progress_token: json!("tok"),
            progress: 50.0,
            total: Some(100.0),
            message: message.map(String::from),
        }
    }

    #[test]
    fn test_progress_message_stripped_for_2024() {
        let n = project_progress(&progress(Some("halfway")), ProtocolVersion::V2024_11_05).unwrap();
        let v = serde_json::to_value(&n).unwrap();
        assert!(v["params"].get("message").is_none());
        assert_eq!(v["params"]["progress"], json!(50.0));
    }

    #[test]
    fn test_progress_message_kept_for_2025_and_draft() {
        for version in [ProtocolVersion::V2025_03_26, ProtocolVersion::Draft] {
            let n = project_progress(&progress(Some("halfway")), version).unwrap();
            let v = serde_json::to_value(&n).unwrap();
            assert_eq!(v["params"]["message"], json!("halfway"));
        }
    }

    #[test]
    fn test_audio_rejected_for_2024() {
        let block = ContentBlock::audio("AAAA", "audio/wav");
        assert!(project_content(&block, ProtocolVersion::V2024_11_05).is_err());
        assert!(project_content(&block, ProtocolVersion::V2025_03_26).is_ok());
    }

    #[test]
    fn test_tool_result_audio_gate() {
        let result = ToolResult {
            content: vec![ContentBlock::text("ok"), ContentBlock::audio("AAAA", "audio/wav")],
            is_error: false,
        };
        assert!(project_tool_result(&result, ProtocolVersion::V2024_11_05).is_err());
        let projected = project_tool_result(&result, ProtocolVersion::Draft).unwrap();
        assert_eq!(projected.content.len(), 2);
    }

    #[test]
    fn test_sampling_streaming_gate() {
        let params = CreateMessageParams {
            messages: vec![SamplingMessage {
                role: Role::User,
                content: ContentBlock::text("hi"),
            }],
            model_preferences: None,
            system_prompt: None,
            max_tokens: Some(64),
            streaming: Some(true),
            chunk_size: None,
            meta: None,
        };
        assert!(project_sampling_params(&params, ProtocolVersion::V2024_11_05).is_err());
        assert!(project_sampling_params(&params, ProtocolVersion::V2025_03_26).is_ok());

        let non_streaming = CreateMessageParams {
            streaming: None,
            ..params
        };
        assert!(project_sampling_params(&non_streaming, ProtocolVersion::V2024_11_05).is_ok());
    }
}
