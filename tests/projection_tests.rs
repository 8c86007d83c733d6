// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! Version projection fixtures (P8): every emitted wire object conforms to
//! the negotiated revision's shape.

use serde_json::{Value, json};

use spectra_mcp_rs::prelude::*;
use spectra_mcp_rs::protocol::projection;
use spectra_mcp_rs::protocol::version::SUPPORTED_VERSIONS;

fn progress(message: Option<&str>) -> ProgressParams {
    ProgressParams {
        progress_token: json!("tok-1"),
        progress: 42.0,
        total: Some(100.0),
        message: message.map(String::from),
    }
}

#[test]
fn test_progress_fixtures_per_version() {
    for version in SUPPORTED_VERSIONS {
        let n = projection::project_progress(&progress(Some("working")), version).unwrap();
        let wire = serde_json::to_value(&n).unwrap();

        assert_eq!(wire["jsonrpc"], json!("2.0"));
        assert_eq!(wire["method"], json!("notifications/progress"));
        assert_eq!(wire["params"]["progressToken"], json!("tok-1"));
        assert_eq!(wire["params"]["progress"], json!(42.0));
        assert_eq!(wire["params"]["total"], json!(100.0));

        if version.supports_progress_message() {
            assert_eq!(wire["params"]["message"], json!("working"));
        } else {
            assert!(
                wire["params"].get("message").is_none(),
                "no message key may appear on {version}"
            );
        }
    }
}

#[test]
fn test_tool_result_fixtures_per_version() {
    let text_only = ToolResult {
        content: vec![ContentBlock::text("done")],
        is_error: false,
    };
    let with_audio = ToolResult {
        content: vec![
            ContentBlock::text("done"),
            ContentBlock::audio("UklGRg==", "audio/wav"),
        ],
        is_error: false,
    };

    for version in SUPPORTED_VERSIONS {
        let wire =
            serde_json::to_value(projection::project_tool_result(&text_only, version).unwrap())
                .unwrap();
        assert_eq!(wire["content"][0], json!({"type": "text", "text": "done"}));
        assert_eq!(wire["isError"], json!(false));

        let audio_result = projection::project_tool_result(&with_audio, version);
        assert_eq!(audio_result.is_ok(), version.supports_audio());
    }
}

#[test]
fn test_prompt_message_fixtures_per_version() {
    let result = GetPromptResult {
        description: None,
        messages: vec![
            PromptMessage {
                role: Role::User,
                content: ContentBlock::text("hello"),
            },
            PromptMessage {
                role: Role::Assistant,
                content: ContentBlock::image("aW1n", "image/png"),
            },
        ],
    };
    // Text and image exist in every revision.
    for version in SUPPORTED_VERSIONS {
        let wire =
            serde_json::to_value(projection::project_prompt_result(&result, version).unwrap())
                .unwrap();
        assert_eq!(wire["messages"][0]["content"]["type"], json!("text"));
        assert_eq!(wire["messages"][1]["content"]["type"], json!("image"));
        assert_eq!(wire["messages"][1]["content"]["mimeType"], json!("image/png"));
    }

    let audio_prompt = GetPromptResult {
        description: None,
        messages: vec![PromptMessage {
            role: Role::Assistant,
            content: ContentBlock::audio("YQ==", "audio/mp3"),
        }],
    };
    assert!(
        projection::project_prompt_result(&audio_prompt, ProtocolVersion::V2024_11_05).is_err()
    );
    assert!(projection::project_prompt_result(&audio_prompt, ProtocolVersion::Draft).is_ok());
}

#[test]
fn test_sampling_fixtures_per_version() {
    let base = CreateMessageParams {
        messages: vec![SamplingMessage {
            role: Role::User,
            content: ContentBlock::text("summarize this"),
        }],
        model_preferences: Some(ModelPreferences {
            hints: Some(vec![ModelHint {
                name: Some("claude".to_string()),
            }]),
            cost_priority: None,
            speed_priority: Some(0.8),
            intelligence_priority: None,
        }),
        system_prompt: Some("be brief".to_string()),
        max_tokens: Some(256),
        streaming: None,
        chunk_size: None,
        meta: None,
    };

    for version in SUPPORTED_VERSIONS {
        let wire =
            serde_json::to_value(projection::project_sampling_params(&base, version).unwrap())
                .unwrap();
        assert_eq!(wire["maxTokens"], json!(256));
        assert_eq!(wire["systemPrompt"], json!("be brief"));
        assert_eq!(wire["modelPreferences"]["speedPriority"], json!(0.8));
    }

    let streaming = CreateMessageParams {
        streaming: Some(true),
        ..base.clone()
    };
    assert!(
        projection::project_sampling_params(&streaming, ProtocolVersion::V2024_11_05).is_err()
    );
    assert!(
        projection::project_sampling_params(&streaming, ProtocolVersion::V2025_03_26).is_ok()
    );

    let audio_result = CreateMessageResult {
        role: Role::Assistant,
        content: ContentBlock::audio("YQ==", "audio/wav"),
        model: "local".to_string(),
        stop_reason: Some("endTurn".to_string()),
    };
    assert!(
        projection::project_sampling_result(&audio_result, ProtocolVersion::V2024_11_05).is_err()
    );
    let wire = serde_json::to_value(
        projection::project_sampling_result(&audio_result, ProtocolVersion::Draft).unwrap(),
    )
    .unwrap();
    assert_eq!(wire["content"]["type"], json!("audio"));
    assert_eq!(wire["stopReason"], json!("endTurn"));
}

#[test]
fn test_negotiation_table() {
    use spectra_mcp_rs::protocol::version::negotiate;
    assert_eq!(negotiate("2024-11-05"), ProtocolVersion::V2024_11_05);
    assert_eq!(negotiate("2025-03-26"), ProtocolVersion::V2025_03_26);
    assert_eq!(negotiate("draft"), ProtocolVersion::Draft);
    // Unknown/lower than supported: answered with our oldest.
    assert_eq!(negotiate("2023-06-01"), ProtocolVersion::V2024_11_05);
}
