use super::traits::{Tool, ToolResult};
use crate::clock::Clock;
use crate::config::SharedTimezone;
use crate::ratelimit::RateLimiter;
use crate::store::{Namespace, Store};
use async_trait::async_trait;
use chrono_tz::Tz;
use serde_json::{Value, json};
use std::sync::Arc;

fn version_string() -> String {
    format!("emberclaw v{}", env!("CARGO_PKG_VERSION"))
}

/// Resident set size in KB, best effort. Stands in for the free-heap gauges
/// of the original hardware.
fn process_rss_kb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4)
}

pub struct GetVersionTool;

#[async_trait]
impl Tool for GetVersionTool {
    fn name(&self) -> &str {
        "get_version"
    }

    fn description(&self) -> &str {
        "Report the firmware version"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        ToolResult::ok(version_string())
    }
}

pub struct GetHealthTool {
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    timezone: Arc<SharedTimezone>,
}

impl GetHealthTool {
    pub fn new(
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        timezone: Arc<SharedTimezone>,
    ) -> Self {
        Self {
            limiter,
            clock,
            timezone,
        }
    }
}

#[async_trait]
impl Tool for GetHealthTool {
    fn name(&self) -> &str {
        "get_health"
    }

    fn description(&self) -> &str {
        "Report runtime health: memory, request quota, time sync, timezone"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        let (hour, day) = self.limiter.snapshot();
        let mem = process_rss_kb()
            .map_or_else(|| "n/a".to_string(), |kb| format!("{kb} KB rss"));
        ToolResult::ok(format!(
            "Health: OK | Mem: {mem} | Requests: {hour}/hr, {day}/day | Time: {} | TZ: {} | Version: {}",
            if self.clock.is_synced() { "synced" } else { "not synced" },
            self.timezone.get().name(),
            env!("CARGO_PKG_VERSION"),
        ))
    }
}

pub struct SetTimezoneTool {
    store: Arc<dyn Store>,
    timezone: Arc<SharedTimezone>,
}

impl SetTimezoneTool {
    pub fn new(store: Arc<dyn Store>, timezone: Arc<SharedTimezone>) -> Self {
        Self { store, timezone }
    }
}

#[async_trait]
impl Tool for SetTimezoneTool {
    fn name(&self) -> &str {
        "set_timezone"
    }

    fn description(&self) -> &str {
        "Set the timezone used for schedules, e.g. America/Los_Angeles"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"tz": {"type": "string", "description": "Timezone name"}},
            "required": ["tz"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(raw) = args["tz"].as_str() else {
            return ToolResult::err("Error: 'tz' required (string)");
        };
        let Ok(tz) = raw.trim().parse::<Tz>() else {
            return ToolResult::err(format!("Error: unknown timezone '{raw}'"));
        };

        if let Err(e) = self.store.put(Namespace::Timezone, "posix", tz.name()) {
            return ToolResult::err(format!("Error: {e}"));
        }
        self.timezone.set(tz);
        ToolResult::ok(format!("Timezone set to {}", tz.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemStore;

    #[tokio::test]
    async fn version_reports_package_version() {
        let result = GetVersionTool.execute(json!({})).await;
        assert_eq!(
            result.output,
            format!("emberclaw v{}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[tokio::test]
    async fn health_reflects_quota_and_timezone() {
        let clock = ManualClock::new(1_700_000_000);
        let limiter = Arc::new(RateLimiter::new(clock.clone(), 30, 200));
        limiter.admit();
        let timezone = Arc::new(SharedTimezone::new(Tz::UTC));
        let tool = GetHealthTool::new(limiter, clock, timezone);

        let result = tool.execute(json!({})).await;
        assert!(result.success);
        assert!(result.output.starts_with("Health: OK"));
        assert!(result.output.contains("Requests: 1/hr, 1/day"));
        assert!(result.output.contains("Time: synced"));
        assert!(result.output.contains("TZ: UTC"));
    }

    #[tokio::test]
    async fn set_timezone_validates_and_persists() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let timezone = Arc::new(SharedTimezone::new(Tz::UTC));
        let tool = SetTimezoneTool::new(Arc::clone(&store), Arc::clone(&timezone));

        let result = tool.execute(json!({"tz": "America/Los_Angeles"})).await;
        assert_eq!(result.output, "Timezone set to America/Los_Angeles");
        assert_eq!(
            store.get(Namespace::Timezone, "posix").unwrap(),
            "America/Los_Angeles"
        );
        assert_eq!(timezone.get(), chrono_tz::America::Los_Angeles);

        let result = tool.execute(json!({"tz": "Nowhere/Atlantis"})).await;
        assert!(!result.success);
        assert_eq!(timezone.get(), chrono_tz::America::Los_Angeles);
    }
}
