use super::traits::{Tool, ToolResult};
use crate::config::GpioPolicy;
use crate::hal::I2cBus;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const ADDR_FIRST: u8 = 0x03;
const ADDR_LAST: u8 = 0x77;
const DEFAULT_FREQ_HZ: u32 = 100_000;
const MIN_FREQ_HZ: u32 = 10_000;
const MAX_FREQ_HZ: u32 = 1_000_000;

pub struct I2cScanTool {
    bus: Arc<dyn I2cBus>,
    policy: GpioPolicy,
}

impl I2cScanTool {
    pub fn new(bus: Arc<dyn I2cBus>, policy: GpioPolicy) -> Self {
        Self { bus, policy }
    }

    fn check_pin(&self, label: &str, pin: u8) -> Result<(), String> {
        if self.policy.is_allowed(pin) {
            Ok(())
        } else {
            Err(format!(
                "Error: {label} pin {pin} not allowed (allowed: {})",
                self.policy.describe_allowed()
            ))
        }
    }
}

#[async_trait]
impl Tool for I2cScanTool {
    fn name(&self) -> &str {
        "i2c_scan"
    }

    fn description(&self) -> &str {
        "Scan the I2C bus on the given pins and list responding device addresses"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sda_pin": {"type": "integer"},
                "scl_pin": {"type": "integer"},
                "frequency_hz": {"type": "integer", "description": "Bus clock, 10000-1000000 (default 100000)"}
            },
            "required": ["sda_pin", "scl_pin"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(sda_pin) = args["sda_pin"].as_i64().and_then(|p| u8::try_from(p).ok()) else {
            return ToolResult::err("Error: 'sda_pin' required (number)");
        };
        let Some(scl_pin) = args["scl_pin"].as_i64().and_then(|p| u8::try_from(p).ok()) else {
            return ToolResult::err("Error: 'scl_pin' required (number)");
        };
        let frequency_hz = match args.get("frequency_hz") {
            None | Some(Value::Null) => DEFAULT_FREQ_HZ,
            Some(value) => match value.as_i64().and_then(|f| u32::try_from(f).ok()) {
                Some(f) => f,
                None => return ToolResult::err("Error: 'frequency_hz' must be a number"),
            },
        };

        if sda_pin == scl_pin {
            return ToolResult::err("Error: SDA and SCL must be different pins");
        }
        if let Err(msg) = self.check_pin("SDA", sda_pin) {
            return ToolResult::err(msg);
        }
        if let Err(msg) = self.check_pin("SCL", scl_pin) {
            return ToolResult::err(msg);
        }
        if !(MIN_FREQ_HZ..=MAX_FREQ_HZ).contains(&frequency_hz) {
            return ToolResult::err(format!(
                "Error: frequency_hz must be {MIN_FREQ_HZ}-{MAX_FREQ_HZ}"
            ));
        }

        if let Err(e) = self.bus.setup(sda_pin, scl_pin, frequency_hz).await {
            return ToolResult::err(format!("Error: i2c setup failed: {e}"));
        }

        // The bus is claimed from here on; every return path below must
        // release it first.
        let mut found: Vec<u8> = Vec::new();
        for address in ADDR_FIRST..=ADDR_LAST {
            match self.bus.probe(address).await {
                Ok(true) => found.push(address),
                Ok(false) => {}
                Err(e) => {
                    self.bus.teardown().await;
                    return ToolResult::err(format!("Error: i2c probe failed at 0x{address:02X}: {e}"));
                }
            }
        }
        self.bus.teardown().await;

        if found.is_empty() {
            return ToolResult::ok(format!(
                "No I2C devices found on SDA={sda_pin} SCL={scl_pin} @ {frequency_hz} Hz"
            ));
        }
        let listed = found
            .iter()
            .map(|addr| format!("0x{addr:02X}"))
            .collect::<Vec<_>>()
            .join(", ");
        ToolResult::ok(format!(
            "Found {} I2C device(s) on SDA={sda_pin} SCL={scl_pin} @ {frequency_hz} Hz: {listed}",
            found.len()
        ))
    }
}
