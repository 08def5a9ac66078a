use async_trait::async_trait;
use serde_json::Value;

/// Byte cap for a tool result; longer output is truncated with a marker.
pub const RESULT_BUDGET_BYTES: usize = 512;

/// Tool handlers must return within this bound.
pub const HANDLER_TIMEOUT_SECS: u64 = 2;

/// Spec of one tool as advertised to the LLM.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the argument object.
    pub parameters: Value,
}

/// Outcome of one tool execution. Both sides fit the result budget; failures
/// are data, not control flow, and become Tool turns like any result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: clamp_result(output.into()),
        }
    }

    pub fn err(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: clamp_result(output.into()),
        }
    }
}

/// Truncate to [`RESULT_BUDGET_BYTES`] with an explicit overflow marker.
fn clamp_result(mut output: String) -> String {
    const MARKER: &str = "…";
    if output.len() <= RESULT_BUDGET_BYTES {
        return output;
    }
    let mut cut = RESULT_BUDGET_BYTES - MARKER.len();
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str(MARKER);
    output
}

/// Core tool trait, one implementation per built-in capability. Each tool
/// is constructed with the resources it needs; execution only sees the
/// argument object.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name used in LLM function calling, `[A-Za-z0-9_]{1,32}`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> ToolResult;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tool names share the store-key character discipline.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
