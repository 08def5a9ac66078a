use super::JobRepository;
use crate::channels::Message;
use crate::clock::Clock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Duration};

/// The scheduler tick task. Every tick it fires the due jobs by pushing
/// synthetic messages onto the agent's input queue. The push is non-blocking:
/// a full queue drops the firing with a log line and leaves the job's
/// `next_fire_epoch` untouched, so nothing is lost silently.
pub async fn run(
    repo: Arc<JobRepository>,
    clock: Arc<dyn Clock>,
    input_tx: mpsc::Sender<Message>,
    tick_secs: u64,
) -> anyhow::Result<()> {
    let mut interval = time::interval(Duration::from_secs(tick_secs.max(1)));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    tracing::info!("Scheduler running, tick every {tick_secs}s");

    loop {
        interval.tick().await;
        tick_once(&repo, clock.as_ref(), &input_tx);
    }
}

/// One scheduler pass, extracted so tests can drive it without the timer.
pub fn tick_once(
    repo: &JobRepository,
    clock: &dyn Clock,
    input_tx: &mpsc::Sender<Message>,
) {
    if !clock.is_synced() {
        tracing::debug!("Scheduler idle: clock not yet synced");
        return;
    }
    let now = clock.now_epoch();

    for job in repo.due_jobs(now) {
        match input_tx.try_send(Message::schedule(&job.action)) {
            Ok(()) => {
                tracing::info!("Fired job {}: {}", job.id, job.action);
                if let Err(e) = repo.mark_fired(&job, now) {
                    tracing::warn!("Failed to persist firing of job {}: {e}", job.id);
                }
            }
            Err(_) => {
                tracing::warn!("Input queue full, job {} stays scheduled", job.id);
            }
        }
    }
}
