use crate::channels::Message;
use crate::error::LlmError;
use crate::history::{ConversationHistory, ToolCallMeta, Turn};
use crate::providers::{LlmTransport, Reply};
use crate::ratelimit::RateLimiter;
use crate::tools::traits::HANDLER_TIMEOUT_SECS;
use crate::tools::{Resolved, ToolRegistry, schema};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::time::Duration;

/// LLM round trips allowed per inbound message.
pub const MAX_TOOL_ITERATIONS: u32 = 5;

/// Final assistant text when the loop exhausts its budget.
pub const ITERATION_LIMIT_REPLY: &str = "Reached iteration limit; stopping.";

const SAFE_MODE_REPLY: &str =
    "Safe mode: repeated boot failures detected; LLM and scheduler stay off until re-provisioning.";

const NOT_CONFIGURED_REPLY: &str =
    "LLM not configured. Set cc_provider, cc_api_key and cc_model, then reboot.";

const SYSTEM_PROMPT: &str = "You are a small always-on assistant living on a microcontroller. \
You control the device through the provided tools: GPIO, I2C scanning, persistent memory, \
schedules and user-defined tools. Keep replies to one or two short sentences. \
When a request maps to a tool, call the tool instead of describing what you would do.";

/// The agent: consumes one inbound message at a time, drives the bounded
/// tool-calling loop against the LLM, and emits at most one final reply per
/// message. It owns the conversation history and the rate-limit writer side.
pub struct Agent {
    transport: Option<LlmTransport>,
    registry: Arc<ToolRegistry>,
    limiter: Arc<RateLimiter>,
    history: ConversationHistory,
    safe_mode: bool,
    max_iterations: u32,
    auth_error_logged: AtomicBool,
}

impl Agent {
    pub fn new(
        transport: Option<LlmTransport>,
        registry: Arc<ToolRegistry>,
        limiter: Arc<RateLimiter>,
        safe_mode: bool,
    ) -> Self {
        Self {
            transport,
            registry,
            limiter,
            history: ConversationHistory::new(),
            safe_mode,
            max_iterations: MAX_TOOL_ITERATIONS,
            auth_error_logged: AtomicBool::new(false),
        }
    }

    /// The agent task: process the input queue to completion, one message at
    /// a time, pushing replies onto the output queue.
    pub async fn run(
        mut self,
        mut input_rx: mpsc::Receiver<Message>,
        output_tx: mpsc::Sender<Message>,
    ) -> anyhow::Result<()> {
        tracing::info!("Agent ready");
        while let Some(message) = input_rx.recv().await {
            tracing::info!("Processing message from {:?}", message.origin);
            if let Some(reply) = self.handle_message(&message).await {
                let outbound = Message::new(message.origin, reply);
                if output_tx.send(outbound).await.is_err() {
                    anyhow::bail!("output queue closed");
                }
            }
        }
        Ok(())
    }

    /// One full turn. Returns the single user-facing reply, if any.
    pub async fn handle_message(&mut self, message: &Message) -> Option<String> {
        if self.safe_mode {
            return Some(SAFE_MODE_REPLY.to_string());
        }
        if let Some(denied) = self.limiter.admit().user_message() {
            return Some(denied);
        }
        if self.transport.is_none() {
            return Some(NOT_CONFIGURED_REPLY.to_string());
        }

        // The working history is moved out for the turn so the loop can
        // borrow the rest of the agent immutably.
        let mut history = std::mem::take(&mut self.history);
        history.push(Turn::user(&message.text));
        let reply = self.drive(&mut history, 0).await;
        self.history = history;
        Some(reply)
    }

    /// The bounded reasoning loop. `depth` 0 is the inbound turn; user-tool
    /// sub-loops run at depth 1 over their own fresh history.
    async fn drive(&self, history: &mut ConversationHistory, depth: u8) -> String {
        let Some(transport) = self.transport.as_ref() else {
            return NOT_CONFIGURED_REPLY.to_string();
        };
        let manifest = self.registry.specs();

        for _ in 0..self.max_iterations {
            let reply = transport
                .complete(Some(SYSTEM_PROMPT), &history.snapshot(), &manifest)
                .await;

            match reply {
                Ok(Reply::AssistantText(text)) => {
                    history.push(Turn::assistant(&text));
                    return text;
                }
                Ok(Reply::ToolCall(call)) => {
                    let result = self.execute_tool(&call, depth).await;
                    tracing::debug!("Tool {} -> {result}", call.name);
                    history.push(Turn::tool(call, result));
                }
                Err(e) => return self.user_facing_failure(&e),
            }
        }

        history.push(Turn::assistant(ITERATION_LIMIT_REPLY));
        ITERATION_LIMIT_REPLY.to_string()
    }

    /// Resolve and execute one tool call; the returned string becomes the
    /// Tool turn content. Failures are data here, never loop aborts.
    async fn execute_tool(&self, call: &ToolCallMeta, depth: u8) -> String {
        match self.registry.resolve(&call.name) {
            None => crate::error::ToolError::Unknown(call.name.clone()).to_string(),
            Some(Resolved::Builtin(tool)) => {
                if let Err(reason) = schema::validate_args(&tool.parameters_schema(), &call.arguments)
                {
                    return format!("Invalid arguments for {}: {reason}", call.name);
                }
                let run = tool.execute(call.arguments.clone());
                match tokio::time::timeout(Duration::from_secs(HANDLER_TIMEOUT_SECS), run).await {
                    Ok(result) => result.output,
                    Err(_) => format!(
                        "Error: tool {} timed out after {HANDLER_TIMEOUT_SECS}s",
                        call.name
                    ),
                }
            }
            Some(Resolved::User(def)) => {
                if depth >= 1 {
                    return format!("Tool {} failed: user tools cannot invoke user tools", def.name);
                }
                // Reference behaviour for user tools: re-submit the action
                // text as a user-level directive inside a fresh bounded loop.
                let mut sub_history = ConversationHistory::new();
                sub_history.push(Turn::user(&def.action));
                Box::pin(self.drive(&mut sub_history, depth + 1)).await
            }
        }
    }

    fn user_facing_failure(&self, error: &LlmError) -> String {
        match error {
            LlmError::Auth => {
                if !self.auth_error_logged.swap(true, Ordering::SeqCst) {
                    tracing::error!("LLM authentication rejected; check the configured API key");
                }
                "LLM not configured (authentication rejected)".to_string()
            }
            LlmError::RateLimitedByVendor => "LLM unavailable (vendor rate limit)".to_string(),
            LlmError::Transport(_) | LlmError::InvalidResponse(_) | LlmError::Truncated => {
                tracing::warn!("LLM turn failed: {error}");
                "LLM unavailable".to_string()
            }
        }
    }

    /// The rolling history, exposed for inspection and tests.
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }
}
