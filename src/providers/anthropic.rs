use super::Reply;
use crate::error::LlmError;
use crate::history::{ToolCallMeta, Turn, TurnRole};
use crate::tools::traits::ToolSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct ChatRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicToolDef>>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<InputContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContentBlock {
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicToolDef {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ResponseContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unsupported,
}

/// Encode a request body for `POST /v1/messages`.
///
/// A Tool turn expands into the assistant `tool_use` block it answers plus a
/// user-role `tool_result` block referencing the call id, which is how the
/// vendor expects tool round trips to be replayed.
pub(super) fn build_request(
    model: &str,
    system: Option<&str>,
    turns: &[Turn],
    tools: &[ToolSpec],
) -> ChatRequest {
    let mut messages = Vec::with_capacity(turns.len());
    for turn in turns {
        match turn.role {
            TurnRole::User => messages.push(Message {
                role: "user",
                content: MessageContent::Text(turn.content.clone()),
            }),
            TurnRole::Assistant => messages.push(Message {
                role: "assistant",
                content: MessageContent::Text(turn.content.clone()),
            }),
            TurnRole::Tool => {
                let Some(call) = &turn.tool_call else {
                    continue;
                };
                messages.push(Message {
                    role: "assistant",
                    content: MessageContent::Blocks(vec![InputContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    }]),
                });
                messages.push(Message {
                    role: "user",
                    content: MessageContent::Blocks(vec![InputContentBlock::ToolResult {
                        tool_use_id: call.id.clone(),
                        content: turn.content.clone(),
                    }]),
                });
            }
        }
    }

    let tool_defs = if tools.is_empty() {
        None
    } else {
        Some(
            tools
                .iter()
                .map(|tool| AnthropicToolDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect(),
        )
    };

    ChatRequest {
        model: model.to_string(),
        max_tokens: 1024,
        system: system.map(ToString::to_string),
        messages,
        tools: tool_defs,
    }
}

pub(super) fn decode_reply(body: &str) -> Result<Reply, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    for block in &response.content {
        if let ResponseContentBlock::ToolUse { id, name, input } = block {
            return Ok(Reply::ToolCall(ToolCallMeta {
                id: id.clone(),
                name: name.clone(),
                arguments: input.clone(),
            }));
        }
    }

    let text = response
        .content
        .iter()
        .filter_map(|block| match block {
            ResponseContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        return Err(LlmError::InvalidResponse("empty content".into()));
    }
    Ok(Reply::AssistantText(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Turn;
    use serde_json::json;

    fn spec() -> ToolSpec {
        ToolSpec {
            name: "gpio_set".into(),
            description: "Drive a GPIO pin".into(),
            parameters: json!({
                "type": "object",
                "properties": {"pin": {"type": "integer"}, "level": {"type": "integer"}},
                "required": ["pin", "level"]
            }),
        }
    }

    #[test]
    fn request_carries_system_and_tools() {
        let turns = [Turn::user("set gpio 5 high")];
        let request = build_request("claude-sonnet-4-5", Some("You run a device."), &turns, &[spec()]);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "claude-sonnet-4-5");
        assert_eq!(value["system"], "You run a device.");
        assert_eq!(value["tools"][0]["name"], "gpio_set");
        assert_eq!(value["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "set gpio 5 high");
    }

    #[test]
    fn tool_turn_expands_to_tool_use_and_tool_result() {
        let turns = [
            Turn::user("scan the bus"),
            Turn::tool(
                ToolCallMeta {
                    id: "toolu_1".into(),
                    name: "i2c_scan".into(),
                    arguments: json!({"sda_pin": 21, "scl_pin": 22}),
                },
                "Found 1 I2C device(s): 0x3C",
            ),
        ];
        let value = serde_json::to_value(build_request("m", None, &turns, &[])).unwrap();

        assert_eq!(value["messages"][1]["role"], "assistant");
        assert_eq!(value["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(value["messages"][1]["content"][0]["id"], "toolu_1");
        assert_eq!(value["messages"][2]["role"], "user");
        assert_eq!(value["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(value["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert!(value.get("tools").is_none());
        assert!(value.get("system").is_none());
    }

    #[test]
    fn decodes_text_reply() {
        let body = r#"{"content":[{"type":"text","text":"Hi!"}]}"#;
        match decode_reply(body).unwrap() {
            Reply::AssistantText(text) => assert_eq!(text, "Hi!"),
            Reply::ToolCall(_) => panic!("expected text"),
        }
    }

    #[test]
    fn decodes_tool_call_reply() {
        let body = r#"{
            "content":[
                {"type":"text","text":"Let me check."},
                {"type":"tool_use","id":"toolu_2","name":"get_health","input":{}}
            ],
            "stop_reason":"tool_use"
        }"#;
        match decode_reply(body).unwrap() {
            Reply::ToolCall(call) => {
                assert_eq!(call.id, "toolu_2");
                assert_eq!(call.name, "get_health");
                assert_eq!(call.arguments, json!({}));
            }
            Reply::AssistantText(_) => panic!("expected tool call"),
        }
    }

    #[test]
    fn unknown_blocks_are_skipped() {
        let body = r#"{"content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"ok"}]}"#;
        assert!(matches!(
            decode_reply(body).unwrap(),
            Reply::AssistantText(text) if text == "ok"
        ));
    }

    #[test]
    fn empty_content_is_invalid() {
        assert!(matches!(
            decode_reply(r#"{"content":[]}"#),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
