mod anthropic;
mod openai;
mod transport;

pub use transport::LlmTransport;

use crate::history::ToolCallMeta;

/// The LLM vendors this runtime speaks to. Selected once at startup from the
/// persistent config; request shape, response shape and auth header all
/// follow from a direct match on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorProfile {
    Anthropic,
    OpenAi,
    OpenRouter,
}

impl VendorProfile {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-5",
            Self::OpenAi => "gpt-4o-mini",
            Self::OpenRouter => "openrouter/auto",
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        }
    }

    /// Path portion of the endpoint, used to rebase onto a test server.
    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::Anthropic => "/v1/messages",
            Self::OpenAi | Self::OpenRouter => "/v1/chat/completions",
        }
    }
}

/// One decoded vendor reply: either the final text for the user or a tool
/// invocation to execute and feed back.
#[derive(Debug, Clone)]
pub enum Reply {
    AssistantText(String),
    ToolCall(ToolCallMeta),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_vendors() {
        assert_eq!(VendorProfile::parse("anthropic"), Some(VendorProfile::Anthropic));
        assert_eq!(VendorProfile::parse(" OpenAI "), Some(VendorProfile::OpenAi));
        assert_eq!(
            VendorProfile::parse("openrouter"),
            Some(VendorProfile::OpenRouter)
        );
        assert_eq!(VendorProfile::parse("gemini"), None);
    }

    #[test]
    fn openrouter_shares_the_openai_path() {
        assert_eq!(
            VendorProfile::OpenAi.endpoint_path(),
            VendorProfile::OpenRouter.endpoint_path()
        );
        assert_ne!(
            VendorProfile::OpenAi.default_endpoint(),
            VendorProfile::OpenRouter.default_endpoint()
        );
    }
}
