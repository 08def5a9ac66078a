use async_trait::async_trait;
use std::sync::Mutex;

/// Seam for the GPIO driver. The electrical layer lives outside this crate;
/// the runtime only needs to drive a validated pin to a level.
#[async_trait]
pub trait GpioDriver: Send + Sync {
    async fn set_level(&self, pin: u8, high: bool) -> anyhow::Result<()>;
}

/// Seam for the I²C master. `setup` claims the bus on the given pins,
/// `probe` address-checks one 7-bit address within the driver timeout, and
/// `teardown` releases the bus. Callers must pair every successful `setup`
/// with a `teardown`, on every exit path.
#[async_trait]
pub trait I2cBus: Send + Sync {
    async fn setup(&self, sda_pin: u8, scl_pin: u8, frequency_hz: u32) -> anyhow::Result<()>;

    async fn probe(&self, address: u8) -> anyhow::Result<bool>;

    async fn teardown(&self);
}

/// Loopback GPIO driver used when no hardware backend is wired in. Records
/// the writes so the health of the dispatch path stays observable.
#[derive(Default)]
pub struct SimGpio {
    writes: Mutex<Vec<(u8, bool)>>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(u8, bool)> {
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GpioDriver for SimGpio {
    async fn set_level(&self, pin: u8, high: bool) -> anyhow::Result<()> {
        self.writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((pin, high));
        tracing::debug!("gpio: pin {pin} driven {}", if high { "HIGH" } else { "LOW" });
        Ok(())
    }
}

/// Loopback I²C bus: reports a configurable set of present addresses.
#[derive(Default)]
pub struct SimI2c {
    devices: Vec<u8>,
    active: Mutex<bool>,
}

impl SimI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<u8>) -> Self {
        Self {
            devices,
            active: Mutex::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        *self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl I2cBus for SimI2c {
    async fn setup(&self, _sda_pin: u8, _scl_pin: u8, _frequency_hz: u32) -> anyhow::Result<()> {
        *self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = true;
        Ok(())
    }

    async fn probe(&self, address: u8) -> anyhow::Result<bool> {
        Ok(self.devices.contains(&address))
    }

    async fn teardown(&self) {
        *self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sim_gpio_records_writes() {
        let gpio = SimGpio::new();
        gpio.set_level(5, true).await.unwrap();
        gpio.set_level(5, false).await.unwrap();
        assert_eq!(gpio.writes(), [(5, true), (5, false)]);
    }

    #[tokio::test]
    async fn sim_i2c_tracks_bus_lifecycle() {
        let bus = SimI2c::with_devices(vec![0x3C]);
        bus.setup(21, 22, 100_000).await.unwrap();
        assert!(bus.is_active());
        assert!(bus.probe(0x3C).await.unwrap());
        assert!(!bus.probe(0x40).await.unwrap());
        bus.teardown().await;
        assert!(!bus.is_active());
    }
}
