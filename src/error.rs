use thiserror::Error;

/// Structured error hierarchy for emberclaw.
///
/// Each subsystem defines its own error enum. Callers match on these to pick
/// a recovery strategy; task-internal code uses `anyhow::Result` for ad-hoc
/// context chains.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("partition corrupted: {0}")]
    Corrupted(String),

    #[error("invalid key '{0}': keys are ascii, at most 15 bytes with namespace prefix")]
    InvalidKey(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("authentication rejected")]
    Auth,

    #[error("rate limited by vendor")]
    RateLimitedByVendor,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("buffer truncated")]
    Truncated,
}

impl LlmError {
    /// Transient failures the transport may retry within the turn.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimitedByVendor)
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("tool '{name}' is built-in and immutable")]
    Immutable { name: String },

    #[error("tool '{name}' already exists")]
    DuplicateName { name: String },

    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("tool '{name}' failed: {detail}")]
    Failed { name: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("unrecognized schedule spec '{0}'")]
    BadSpec(String),

    #[error("job {0} not found")]
    NotFound(u32),

    #[error("clock not synced")]
    ClockNotSynced,

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_llm_errors() {
        assert!(LlmError::Transport("dns".into()).is_retryable());
        assert!(LlmError::RateLimitedByVendor.is_retryable());
        assert!(!LlmError::Auth.is_retryable());
        assert!(!LlmError::InvalidResponse("bad json".into()).is_retryable());
        assert!(!LlmError::Truncated.is_retryable());
    }

    #[test]
    fn tool_error_messages_name_the_tool() {
        let err = ToolError::Failed {
            name: "gpio_set".into(),
            detail: "pin 99 out of range".into(),
        };
        assert_eq!(
            err.to_string(),
            "tool 'gpio_set' failed: pin 99 out of range"
        );
    }
}
