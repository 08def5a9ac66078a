use anyhow::Result;
use emberclaw::hal::{SimGpio, SimI2c};
use emberclaw::supervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let data_dir = std::env::var_os("EMBERCLAW_DATA")
        .map_or_else(|| PathBuf::from("emberclaw-data"), PathBuf::from);

    // Hardware backends plug in through the hal traits; the default build
    // carries the loopback drivers.
    supervisor::run(
        &data_dir,
        Arc::new(SimGpio::new()),
        Arc::new(SimI2c::new()),
    )
    .await
}
