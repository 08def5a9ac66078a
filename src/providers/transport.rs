use super::{Reply, VendorProfile, anthropic, openai};
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::history::{Turn, TurnRole};
use crate::tools::traits::ToolSpec;
use reqwest::Client;
use std::time::Duration;

/// Serialized request bodies must fit this budget; older history turns are
/// dropped until they do.
pub const REQUEST_BUDGET_BYTES: usize = 12 * 1024;

/// Response bodies are read into this bound; overflow is `Truncated`.
pub const RESPONSE_BUDGET_BYTES: usize = 16 * 1024;

const MAX_RETRIES: u32 = 3;

/// Vendor-agnostic LLM client. One instance per process, configured once at
/// startup. `complete` never mutates the caller's history; the working copy
/// it trims for the byte budget is its own.
pub struct LlmTransport {
    client: Client,
    vendor: VendorProfile,
    api_key: String,
    model: String,
    endpoint: String,
    backoff_base_ms: u64,
}

impl LlmTransport {
    pub fn new(config: &LlmConfig, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            vendor: config.vendor,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.vendor.default_endpoint().to_string(),
            backoff_base_ms: 1000,
        }
    }

    /// Rebase onto another server, keeping the vendor's path.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.endpoint = format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            self.vendor.endpoint_path()
        );
        self
    }

    pub fn with_backoff_base_ms(mut self, ms: u64) -> Self {
        self.backoff_base_ms = ms;
        self
    }

    pub fn vendor(&self) -> VendorProfile {
        self.vendor
    }

    /// One LLM round trip over the given history and tool manifest.
    pub async fn complete(
        &self,
        system: Option<&str>,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<Reply, LlmError> {
        let body = self.encode_with_budget(system, turns, tools)?;

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = backoff_delay_ms(self.backoff_base_ms, attempt);
                    tracing::warn!(
                        "LLM request failed ({e}), retry {} of {MAX_RETRIES} in {delay}ms",
                        attempt + 1
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Serialize the request, dropping the oldest turns until the body fits
    /// the budget. The current user turn and everything after it (pending
    /// tool results) are never dropped.
    fn encode_with_budget(
        &self,
        system: Option<&str>,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<String, LlmError> {
        let mut working: Vec<Turn> = turns.to_vec();
        loop {
            let body = self.encode(system, &working, tools);
            if body.len() <= REQUEST_BUDGET_BYTES {
                return Ok(body);
            }
            let protected_from = working
                .iter()
                .rposition(|turn| turn.role == TurnRole::User)
                .unwrap_or(0);
            if protected_from == 0 {
                return Err(LlmError::Truncated);
            }
            working.remove(0);
        }
    }

    fn encode(&self, system: Option<&str>, turns: &[Turn], tools: &[ToolSpec]) -> String {
        match self.vendor {
            VendorProfile::Anthropic => {
                let request = anthropic::build_request(&self.model, system, turns, tools);
                serde_json::to_string(&request).unwrap_or_default()
            }
            VendorProfile::OpenAi | VendorProfile::OpenRouter => {
                let request = openai::build_request(&self.model, system, turns, tools);
                serde_json::to_string(&request).unwrap_or_default()
            }
        }
    }

    async fn send_once(&self, body: &str) -> Result<Reply, LlmError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");
        request = match self.vendor {
            VendorProfile::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
            VendorProfile::OpenAi | VendorProfile::OpenRouter => {
                request.header("authorization", format!("Bearer {}", self.api_key))
            }
        };

        let response = request
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth,
                429 => LlmError::RateLimitedByVendor,
                code if (500..600).contains(&code) => {
                    LlmError::Transport(format!("server status {code}"))
                }
                code => LlmError::InvalidResponse(format!("status {code}")),
            });
        }

        let (raw, truncated) = crate::util::read_capped(response, RESPONSE_BUDGET_BYTES)
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        if truncated {
            return Err(LlmError::Truncated);
        }

        match self.vendor {
            VendorProfile::Anthropic => anthropic::decode_reply(&raw),
            VendorProfile::OpenAi | VendorProfile::OpenRouter => openai::decode_reply(&raw),
        }
    }
}

/// Exponential backoff with ±25% jitter; the jitter source is the wall
/// clock's sub-second phase, the same trick the scheduler retries use.
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let delay = base_ms.saturating_mul(1 << attempt.min(16));
    let quarter = delay / 4;
    if quarter == 0 {
        return delay;
    }
    let span = quarter * 2;
    let phase = u64::from(chrono::Utc::now().timestamp_subsec_millis()) % (span + 1);
    delay - quarter + phase
}
