use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Turns the rolling history may hold.
pub const MAX_TURNS: usize = 12;

/// Byte cap for any turn's content.
pub const MAX_CONTENT_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// Tool-call metadata carried by a Tool turn: the call the vendor issued and
/// the arguments it sent. The result text lives in the turn content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallMeta {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallMeta>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: clamp_content(content.into()),
            tool_call: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: clamp_content(content.into()),
            tool_call: None,
        }
    }

    pub fn tool(meta: ToolCallMeta, result: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Tool,
            content: clamp_content(result.into()),
            tool_call: Some(meta),
        }
    }
}

/// Truncate to [`MAX_CONTENT_BYTES`] on a char boundary.
fn clamp_content(mut content: String) -> String {
    if content.len() <= MAX_CONTENT_BYTES {
        return content;
    }
    let mut cut = MAX_CONTENT_BYTES;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content.truncate(cut);
    content
}

/// Rolling conversation buffer: bounded, oldest-first eviction, in process
/// memory only (cleared by reboot).
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == MAX_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
