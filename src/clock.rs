use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Wall-clock seam.
///
/// On the original hardware the clock starts unsynced and becomes reliable
/// only after SNTP; the rate limiter and scheduler both change behaviour on
/// that flag, so it stays part of the contract here.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_epoch(&self) -> i64;

    /// Whether the wall clock has ever been synced to a trusted source.
    fn is_synced(&self) -> bool;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn is_synced(&self) -> bool {
        true
    }
}

/// Manually driven clock for tests: set the epoch, flip the sync flag.
pub struct ManualClock {
    epoch: AtomicI64,
    synced: AtomicBool,
}

impl ManualClock {
    pub fn new(epoch: i64) -> Arc<Self> {
        Arc::new(Self {
            epoch: AtomicI64::new(epoch),
            synced: AtomicBool::new(true),
        })
    }

    pub fn unsynced() -> Arc<Self> {
        let clock = Self::new(0);
        clock.synced.store(false, Ordering::SeqCst);
        clock
    }

    pub fn set_epoch(&self, epoch: i64) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.epoch.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch(&self) -> i64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(60);
        assert_eq!(clock.now_epoch(), 1_060);
        assert!(clock.is_synced());
    }

    #[test]
    fn unsynced_clock_reports_flag() {
        let clock = ManualClock::unsynced();
        assert!(!clock.is_synced());
        clock.mark_synced();
        assert!(clock.is_synced());
    }
}
