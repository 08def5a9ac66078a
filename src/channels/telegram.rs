use super::{ENQUEUE_TIMEOUT_MS, Message};
use crate::config::TelegramConfig;
use crate::store::{Namespace, Store};
use crate::util::read_capped;
use anyhow::{Context, bail};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Long-poll hold time requested from the API; the HTTP client waits ten
/// seconds longer before giving up on the connection.
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Bound for a getUpdates response body.
pub const POLL_RESPONSE_CAP: usize = 4096;

const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;

const LAST_UPDATE_KEY: &str = "last_update";

/// Update and chat ids above 2^53 would not survive a double-precision
/// parse; ours stay on the i64 path, but a value that large is still worth a
/// log line.
const PRECISION_GUARD: i64 = 1 << 53;

pub struct TelegramClient {
    http: Client,
    poll_http: Client,
    base_url: String,
    token: String,
    chat_id: i64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Self {
        Self::with_base_url(config, "https://api.telegram.org")
    }

    /// Point at another server (tests); the `/bot<token>/<method>` path is
    /// kept.
    pub fn with_base_url(config: &TelegramConfig, base_url: &str) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            poll_http: Client::builder()
                .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            chat_id: config.chat_id,
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// POST one message to the authorised chat. Failures are for the caller
    /// to log; there is no retry, since a missing reply beats a duplicate.
    pub async fn send(&self, text: &str) -> anyhow::Result<()> {
        if self.chat_id == 0 {
            bail!("no chat id configured");
        }
        let body = json!({"chat_id": self.chat_id, "text": text});
        let response = self
            .http
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .context("sendMessage request failed")?;
        if !response.status().is_success() {
            bail!("sendMessage failed with status {}", response.status());
        }
        Ok(())
    }

    pub async fn send_startup(&self) -> anyhow::Result<()> {
        self.send("I'm back online. What can I help you with?").await
    }

    async fn get_updates(&self, body: &Value, long: bool) -> anyhow::Result<reqwest::Response> {
        let client = if long { &self.poll_http } else { &self.http };
        client
            .post(self.api_url("getUpdates"))
            .json(body)
            .send()
            .await
            .context("getUpdates request failed")
    }
}

/// The ingest side: long-polls getUpdates, suppresses pre-boot replay via
/// the startup flush, filters on the authorised chat id, and persists the
/// high-water update id before anything derived from it reaches the agent.
pub struct TelegramPoller {
    client: Arc<TelegramClient>,
    store: Arc<dyn Store>,
    last_update_id: i64,
    needs_flush: bool,
    consecutive_failures: u32,
}

impl TelegramPoller {
    pub fn new(client: Arc<TelegramClient>, store: Arc<dyn Store>) -> Self {
        let persisted = store
            .get(Namespace::ChatConfig, LAST_UPDATE_KEY)
            .ok()
            .and_then(|raw| raw.parse::<i64>().ok());
        Self {
            client,
            store,
            last_update_id: persisted.unwrap_or(0),
            needs_flush: persisted.is_none(),
            consecutive_failures: 0,
        }
    }

    pub async fn run(mut self, input_tx: mpsc::Sender<Message>) -> anyhow::Result<()> {
        tracing::info!("Telegram poller started");
        if self.needs_flush {
            self.flush_pending().await;
            self.needs_flush = false;
        }

        loop {
            match self.poll_once(&input_tx).await {
                Ok(()) => {
                    if self.consecutive_failures > 0 {
                        tracing::info!(
                            "Poll recovered after {} failures",
                            self.consecutive_failures
                        );
                        self.consecutive_failures = 0;
                    }
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    let delay = backoff_secs(self.consecutive_failures);
                    tracing::warn!(
                        "Poll failed ({} consecutive): {e}; backing off {delay}s",
                        self.consecutive_failures
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
            }
        }
    }

    /// Discard updates queued before this boot: fetch the single most recent
    /// pending update to learn the high-water id, acknowledge everything up
    /// to it, and persist. Nothing pending means nothing to persist; the
    /// flush is idempotent.
    pub async fn flush_pending(&mut self) {
        let probe = json!({"offset": -1, "limit": 1, "timeout": 0});
        let last_id = match self.fetch_updates_value(&probe).await {
            Ok(data) => data["result"]
                .as_array()
                .and_then(|updates| updates.first())
                .and_then(|update| update["update_id"].as_i64())
                .unwrap_or(0),
            Err(e) => {
                tracing::warn!("Flush probe failed: {e}");
                return;
            }
        };

        if last_id == 0 {
            tracing::info!("No pending updates to flush");
            return;
        }

        let ack = json!({"offset": last_id + 1, "limit": 1, "timeout": 0});
        if let Err(e) = self.fetch_updates_value(&ack).await {
            tracing::warn!("Flush acknowledge failed: {e}");
        }
        self.advance(last_id);
        tracing::info!("Flushed pending updates up to {last_id}");
    }

    async fn fetch_updates_value(&self, body: &Value) -> anyhow::Result<Value> {
        let response = self.client.get_updates(body, false).await?;
        if !response.status().is_success() {
            bail!("getUpdates status {}", response.status());
        }
        let (raw, truncated) = read_capped(response, POLL_RESPONSE_CAP).await?;
        if truncated {
            bail!("flush response truncated");
        }
        serde_json::from_str(&raw).context("getUpdates body is not JSON")
    }

    /// One long-poll cycle: fetch the next update, advance and persist the
    /// high-water id, enqueue the derived message when authorised.
    pub async fn poll_once(&mut self, input_tx: &mpsc::Sender<Message>) -> anyhow::Result<()> {
        let body = json!({
            "offset": self.last_update_id + 1,
            "limit": 1,
            "timeout": POLL_TIMEOUT_SECS,
        });
        let response = self.client.get_updates(&body, true).await?;
        if !response.status().is_success() {
            bail!("getUpdates status {}", response.status());
        }

        let (raw, truncated) = read_capped(response, POLL_RESPONSE_CAP).await?;
        if truncated {
            // Recover by advancing past everything visible in the partial
            // buffer instead of reprocessing the batch forever.
            let Some(max_id) = extract_max_update_id(&raw) else {
                bail!("truncated response without parseable update_id");
            };
            self.advance(max_id);
            tracing::warn!("Recovered from truncated response, skipping to update {max_id}");
            return Ok(());
        }

        let data: Value = serde_json::from_str(&raw).context("getUpdates body is not JSON")?;
        if data["ok"] != json!(true) {
            bail!("getUpdates returned ok=false");
        }
        if let Some(updates) = data["result"].as_array() {
            for update in updates {
                self.ingest_update(update, input_tx).await;
            }
        }
        Ok(())
    }

    async fn ingest_update(&mut self, update: &Value, input_tx: &mpsc::Sender<Message>) {
        let Some(update_id) = update["update_id"].as_i64() else {
            return;
        };
        if update_id > PRECISION_GUARD {
            tracing::warn!("Update id {update_id} exceeds 2^53; check id handling");
        }
        if update_id > self.last_update_id {
            // Persisted before the derived message can reach the queue, so a
            // crash never replays this update.
            self.advance(update_id);
        }

        let Some(text) = update["message"]["text"].as_str() else {
            return;
        };
        let Some(chat_id) = update["message"]["chat"]["id"].as_i64() else {
            return;
        };
        if chat_id > PRECISION_GUARD {
            tracing::warn!("Chat id {chat_id} exceeds 2^53; check id handling");
        }

        let authorised = self.client.chat_id();
        if authorised == 0 {
            tracing::warn!("No chat id configured - ignoring message from {chat_id}");
            return;
        }
        if chat_id != authorised {
            tracing::warn!("Rejected message from unauthorized chat {chat_id}");
            return;
        }

        tracing::info!("Received: {text}");
        let send = input_tx.send_timeout(
            Message::chat(text),
            Duration::from_millis(ENQUEUE_TIMEOUT_MS),
        );
        if send.await.is_err() {
            tracing::warn!("Input queue full, dropping chat message");
        }
    }

    fn advance(&mut self, update_id: i64) {
        self.last_update_id = update_id;
        if let Err(e) = self.store.put(
            Namespace::ChatConfig,
            LAST_UPDATE_KEY,
            &update_id.to_string(),
        ) {
            tracing::warn!("Failed to persist last update id: {e}");
        }
    }

    pub fn last_update_id(&self) -> i64 {
        self.last_update_id
    }
}

fn backoff_secs(consecutive_failures: u32) -> u64 {
    let shift = consecutive_failures.saturating_sub(1).min(10);
    (BACKOFF_BASE_SECS << shift).min(BACKOFF_MAX_SECS)
}

/// Scan a (possibly truncated) getUpdates body for the highest update id.
pub fn extract_max_update_id(raw: &str) -> Option<i64> {
    const NEEDLE: &str = "\"update_id\"";
    let mut best: Option<i64> = None;
    let mut rest = raw;

    while let Some(pos) = rest.find(NEEDLE) {
        rest = &rest[pos + NEEDLE.len()..];
        let after_colon = rest.trim_start();
        let Some(after_colon) = after_colon.strip_prefix(':') else {
            continue;
        };
        let number = after_colon.trim_start();
        let digits: String = number
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        if let Ok(id) = digits.parse::<i64>() {
            best = Some(best.map_or(id, |current| current.max(id)));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_highest_update_id_from_partial_body() {
        let partial = r#"{"ok":true,"result":[
            {"update_id":200,"message":{"text":"a"}},
            {"update_id": 230, "message":{"text":"b"}},
            {"update_id":215,"message":{"text":"c"}},
            {"update_id":2"#;
        assert_eq!(extract_max_update_id(partial), Some(230));
    }

    #[test]
    fn extract_returns_none_without_ids() {
        assert_eq!(extract_max_update_id(r#"{"ok":true,"result":["#), None);
        assert_eq!(extract_max_update_id(""), None);
    }

    #[test]
    fn extract_tolerates_malformed_fragments() {
        let partial = r#"{"update_id":}{"update_id": 42}"#;
        assert_eq!(extract_max_update_id(partial), Some(42));
    }

    #[test]
    fn backoff_doubles_to_five_minute_ceiling() {
        assert_eq!(backoff_secs(1), 5);
        assert_eq!(backoff_secs(2), 10);
        assert_eq!(backoff_secs(3), 20);
        assert_eq!(backoff_secs(7), 300);
        assert_eq!(backoff_secs(30), 300);
    }
}
