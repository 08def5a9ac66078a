use super::traits::{Tool, ToolResult};
use crate::config::GpioPolicy;
use crate::hal::GpioDriver;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct GpioSetTool {
    driver: Arc<dyn GpioDriver>,
    policy: GpioPolicy,
}

impl GpioSetTool {
    pub fn new(driver: Arc<dyn GpioDriver>, policy: GpioPolicy) -> Self {
        Self { driver, policy }
    }
}

#[async_trait]
impl Tool for GpioSetTool {
    fn name(&self) -> &str {
        "gpio_set"
    }

    fn description(&self) -> &str {
        "Drive a GPIO pin high (1) or low (0)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pin": {"type": "integer", "description": "GPIO pin number"},
                "level": {"type": "integer", "description": "1 for high, 0 for low"}
            },
            "required": ["pin", "level"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(pin) = args["pin"].as_i64().and_then(|p| u8::try_from(p).ok()) else {
            return ToolResult::err("Error: 'pin' required (number)");
        };
        let level = match args["level"].as_i64() {
            Some(0) => false,
            Some(1) => true,
            _ => return ToolResult::err("Error: 'level' must be 0 or 1"),
        };

        if !self.policy.is_allowed(pin) {
            return ToolResult::err(format!(
                "Error: pin {pin} not allowed (allowed: {})",
                self.policy.describe_allowed()
            ));
        }

        match self.driver.set_level(pin, level).await {
            Ok(()) => ToolResult::ok(format!(
                "GPIO {pin} = {}",
                if level { "HIGH" } else { "LOW" }
            )),
            Err(e) => ToolResult::err(format!("Error: gpio driver failed: {e}")),
        }
    }
}
