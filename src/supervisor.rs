use crate::agent::Agent;
use crate::channels::{self, Message, QUEUE_DEPTH, telegram::TelegramClient, telegram::TelegramPoller};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SharedTimezone};
use crate::error::StoreError;
use crate::hal::{GpioDriver, I2cBus};
use crate::providers::LlmTransport;
use crate::ratelimit::RateLimiter;
use crate::scheduler::{self, JobRepository};
use crate::store::{FileStore, MemStore, Namespace, Store};
use crate::tools::{self, ToolDeps};
use anyhow::Result;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Consecutive failed boots before the runtime degrades to safe mode.
pub const MAX_BOOT_FAILURES: u32 = 3;

/// Uninterrupted run time after which a boot counts as successful.
pub const BOOT_SUCCESS_DELAY_SECS: u64 = 30;

const BOOT_COUNT_KEY: &str = "count";
const LAST_SUCCESS_KEY: &str = "last_ok";

/// Record this boot attempt and return the consecutive-failure count
/// including it.
pub fn record_boot(store: &dyn Store) -> u32 {
    let count = store
        .get(Namespace::Boot, BOOT_COUNT_KEY)
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(0)
        .saturating_add(1);
    if let Err(e) = store.put(Namespace::Boot, BOOT_COUNT_KEY, &count.to_string()) {
        tracing::warn!("Failed to persist boot counter: {e}");
    }
    count
}

/// Clear the failure counter once the runtime has stayed up long enough.
pub fn mark_boot_stable(store: &dyn Store, now_epoch: i64) {
    if let Err(e) = store.put(Namespace::Boot, BOOT_COUNT_KEY, "0") {
        tracing::warn!("Failed to reset boot counter: {e}");
    }
    if let Err(e) = store.put(Namespace::Boot, LAST_SUCCESS_KEY, &now_epoch.to_string()) {
        tracing::warn!("Failed to record boot success: {e}");
    }
}

/// Restart a long-lived component with exponential backoff whenever it exits
/// or fails. Components are expected to run forever; returning at all is a
/// fault.
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);
        loop {
            match run_component().await {
                Ok(()) => {
                    tracing::warn!("Component '{name}' exited unexpectedly");
                    backoff = initial_backoff_secs.max(1);
                }
                Err(e) => {
                    tracing::error!("Component '{name}' failed: {e}");
                }
            }
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

/// Single consumer of the output queue; fans every reply out to the local
/// channel and, when configured, the chat channel.
async fn run_output_router(
    mut output_rx: mpsc::Receiver<Message>,
    local_tx: mpsc::Sender<String>,
    telegram: Option<Arc<TelegramClient>>,
) {
    while let Some(message) = output_rx.recv().await {
        if local_tx.try_send(message.text.clone()).is_err() {
            tracing::warn!("Local egress queue full, dropping reply");
        }
        if let Some(client) = &telegram {
            if client.chat_id() != 0 {
                if let Err(e) = client.send(&message.text).await {
                    tracing::warn!("Telegram send failed: {e}");
                }
            }
        }
    }
}

/// Bring the whole runtime up in dependency order: store, config, boot
/// health, scheduler state, channels, chat poller, agent, scheduler tick.
/// Subsystem failures log and degrade; only store corruption forces safe
/// mode by itself.
pub async fn run(
    data_dir: &Path,
    gpio: Arc<dyn GpioDriver>,
    i2c: Arc<dyn I2cBus>,
) -> Result<()> {
    // Persistent store. A corrupted partition drops us into safe mode on a
    // volatile store rather than refusing to boot at all.
    let (store, store_corrupted): (Arc<dyn Store>, bool) = match FileStore::open(data_dir) {
        Ok(store) => (Arc::new(store), false),
        Err(StoreError::Corrupted(detail)) => {
            tracing::error!("Persistent store corrupted ({detail}); entering safe mode");
            (Arc::new(MemStore::new()), true)
        }
        Err(e) => return Err(e.into()),
    };

    let config = Config::load(store.as_ref());

    let boot_count = record_boot(store.as_ref());
    let safe_mode = store_corrupted || boot_count >= MAX_BOOT_FAILURES;
    if safe_mode {
        tracing::warn!("Entering safe mode (boot attempt {boot_count})");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let timezone = Arc::new(SharedTimezone::new(config.timezone));
    let limiter = Arc::new(RateLimiter::new(
        Arc::clone(&clock),
        config.limits.hourly_cap,
        config.limits.daily_cap,
    ));
    let jobs = Arc::new(JobRepository::new(
        Arc::clone(&store),
        Arc::clone(&timezone),
    ));
    tracing::info!("Loaded {} scheduled job(s)", jobs.list().len());

    let registry = tools::build_registry(&ToolDeps {
        store: Arc::clone(&store),
        clock: Arc::clone(&clock),
        limiter: Arc::clone(&limiter),
        timezone: Arc::clone(&timezone),
        jobs: Arc::clone(&jobs),
        gpio,
        i2c,
        gpio_policy: config.gpio.clone(),
    });

    let (input_tx, input_rx) = channels::input_queue();
    let (output_tx, output_rx) = channels::output_queue();

    // Local channel tasks.
    let (local_tx, local_rx) = mpsc::channel::<String>(QUEUE_DEPTH);
    let ingest_tx = input_tx.clone();
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = channels::run_ingest(stdin, ingest_tx).await {
            tracing::warn!("Local ingest stopped: {e}");
        }
    });
    tokio::spawn(async move {
        if let Err(e) = channels::run_egress(tokio::io::stdout(), local_rx).await {
            tracing::warn!("Local egress stopped: {e}");
        }
    });

    // Chat poller, restarted with backoff on failure.
    let telegram_client = config
        .telegram
        .as_ref()
        .map(|telegram| Arc::new(TelegramClient::new(telegram)));
    if let Some(client) = &telegram_client {
        let poller_client = Arc::clone(client);
        let poller_store = Arc::clone(&store);
        let poller_tx = input_tx.clone();
        spawn_supervised("telegram-poller", 5, 300, move || {
            let poller = TelegramPoller::new(Arc::clone(&poller_client), Arc::clone(&poller_store));
            let tx = poller_tx.clone();
            async move { poller.run(tx).await }
        });

        if !safe_mode && client.chat_id() != 0 {
            let greeter = Arc::clone(client);
            tokio::spawn(async move {
                if let Err(e) = greeter.send_startup().await {
                    tracing::warn!("Startup greeting failed: {e}");
                }
            });
        }
    } else {
        tracing::info!("Telegram not configured; chat channel disabled");
    }

    tokio::spawn(run_output_router(output_rx, local_tx, telegram_client));

    // Agent task.
    let transport = if safe_mode {
        None
    } else {
        config
            .llm
            .as_ref()
            .map(|llm| LlmTransport::new(llm, config.limits.request_timeout_secs))
    };
    let agent = Agent::new(transport, registry, limiter, safe_mode);
    let agent_handle = tokio::spawn(agent.run(input_rx, output_tx));

    // Scheduler tick, disabled in safe mode.
    if safe_mode {
        tracing::warn!("Scheduler disabled in safe mode");
    } else {
        let tick = config.limits.scheduler_tick_secs;
        let scheduler_jobs = Arc::clone(&jobs);
        let scheduler_clock = Arc::clone(&clock);
        let scheduler_tx = input_tx.clone();
        spawn_supervised("scheduler", 5, 300, move || {
            let jobs = Arc::clone(&scheduler_jobs);
            let clock = Arc::clone(&scheduler_clock);
            let tx = scheduler_tx.clone();
            async move { scheduler::run(jobs, clock, tx, tick).await }
        });
    }

    // Boot counts as successful after a stable window.
    let stable_store = Arc::clone(&store);
    let stable_clock = Arc::clone(&clock);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(BOOT_SUCCESS_DELAY_SECS)).await;
        mark_boot_stable(stable_store.as_ref(), stable_clock.now_epoch());
        tracing::info!("Boot marked stable");
    });

    tracing::info!(
        "emberclaw v{} up{}",
        env!("CARGO_PKG_VERSION"),
        if safe_mode { " (safe mode)" } else { "" }
    );

    // The runtime has no exit; the agent ending means the queues are gone.
    agent_handle.await??;
    anyhow::bail!("agent task ended")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_counter_increments_until_reset() {
        let store = MemStore::new();
        assert_eq!(record_boot(&store), 1);
        assert_eq!(record_boot(&store), 2);
        assert_eq!(record_boot(&store), 3);

        mark_boot_stable(&store, 1_700_000_000);
        assert_eq!(record_boot(&store), 1);
        assert_eq!(
            store.get(Namespace::Boot, LAST_SUCCESS_KEY).unwrap(),
            "1700000000"
        );
    }

    #[test]
    fn third_failed_boot_crosses_the_safe_mode_threshold() {
        let store = MemStore::new();
        let mut last = 0;
        for _ in 0..3 {
            last = record_boot(&store);
        }
        assert!(last >= MAX_BOOT_FAILURES);
    }

    #[tokio::test]
    async fn supervised_component_is_restarted() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let handle = spawn_supervised("test-component", 1, 1, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("boom")
            }
        });

        tokio::time::sleep(Duration::from_millis(1200)).await;
        handle.abort();
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}
