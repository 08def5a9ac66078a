use super::Reply;
use crate::error::LlmError;
use crate::history::{ToolCallMeta, Turn, TurnRole};
use crate::tools::traits::ToolSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: &'static str,
    function: OpenAiToolDef,
}

#[derive(Debug, Serialize)]
struct OpenAiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCallFunction {
    name: String,
    /// The vendor ships arguments as a JSON-encoded string, not an object.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

/// Encode a request body for `POST /v1/chat/completions` (OpenAI and
/// OpenRouter share the shape). A Tool turn expands into the assistant
/// `tool_calls` entry it answers plus a `tool`-role message with the result.
pub(super) fn build_request(
    model: &str,
    system: Option<&str>,
    turns: &[Turn],
    tools: &[ToolSpec],
) -> ChatRequest {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if let Some(system) = system {
        messages.push(Message {
            role: "system",
            content: Some(system.to_string()),
            tool_call_id: None,
            tool_calls: None,
        });
    }

    for turn in turns {
        match turn.role {
            TurnRole::User => messages.push(Message {
                role: "user",
                content: Some(turn.content.clone()),
                tool_call_id: None,
                tool_calls: None,
            }),
            TurnRole::Assistant => messages.push(Message {
                role: "assistant",
                content: Some(turn.content.clone()),
                tool_call_id: None,
                tool_calls: None,
            }),
            TurnRole::Tool => {
                let Some(call) = &turn.tool_call else {
                    continue;
                };
                messages.push(Message {
                    role: "assistant",
                    content: None,
                    tool_call_id: None,
                    tool_calls: Some(vec![OpenAiToolCall {
                        id: call.id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAiToolCallFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    }]),
                });
                messages.push(Message {
                    role: "tool",
                    content: Some(turn.content.clone()),
                    tool_call_id: Some(call.id.clone()),
                    tool_calls: None,
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
                .map(|tool| OpenAiTool {
                    r#type: "function",
                    function: OpenAiToolDef {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        )
    };

    ChatRequest {
        model: model.to_string(),
        messages,
        tools: tool_defs,
    }
}

pub(super) fn decode_reply(body: &str) -> Result<Reply, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(LlmError::InvalidResponse("no choices".into()));
    };

    if let Some(call) = choice
        .message
        .tool_calls
        .and_then(|calls| calls.into_iter().next())
    {
        let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments)
            .map_err(|e| LlmError::InvalidResponse(format!("tool arguments: {e}")))?;
        return Ok(Reply::ToolCall(ToolCallMeta {
            id: call.id,
            name: call.function.name,
            arguments,
        }));
    }

    match choice.message.content {
        Some(text) if !text.is_empty() => Ok(Reply::AssistantText(text)),
        _ => Err(LlmError::InvalidResponse("empty message".into())),
    }
}
