use crate::clock::Clock;
use std::sync::Arc;
use std::sync::Mutex;

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny {
        reason: &'static str,
        retry_after_secs: i64,
    },
}

impl Admission {
    /// Single-line, user-facing denial text.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Admission::Allow => None,
            Admission::Deny {
                retry_after_secs, ..
            } => {
                let minutes = (retry_after_secs + 59) / 60;
                Some(format!("Quota reached, try again in {minutes} min"))
            }
        }
    }
}

#[derive(Debug, Default)]
struct Windows {
    hour_start: i64,
    hour_count: u32,
    day_start: i64,
    day_count: u32,
}

/// Hourly/daily admission counters. Windows align to wall-clock hour and day
/// boundaries (UTC); a counter resets the moment the clock crosses its
/// boundary, before the admission check. While the clock has never synced,
/// admission runs at a quarter of each cap.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    hourly_cap: u32,
    daily_cap: u32,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, hourly_cap: u32, daily_cap: u32) -> Self {
        Self {
            clock,
            hourly_cap,
            daily_cap,
            windows: Mutex::new(Windows::default()),
        }
    }

    fn effective_caps(&self) -> (u32, u32) {
        if self.clock.is_synced() {
            (self.hourly_cap, self.daily_cap)
        } else {
            ((self.hourly_cap / 4).max(1), (self.daily_cap / 4).max(1))
        }
    }

    fn roll(windows: &mut Windows, now: i64) {
        let hour_start = now - now.rem_euclid(HOUR_SECS);
        if hour_start != windows.hour_start {
            windows.hour_start = hour_start;
            windows.hour_count = 0;
        }
        let day_start = now - now.rem_euclid(DAY_SECS);
        if day_start != windows.day_start {
            windows.day_start = day_start;
            windows.day_count = 0;
        }
    }

    /// Check quota and, when allowed, consume one request from both windows.
    pub fn admit(&self) -> Admission {
        let now = self.clock.now_epoch();
        let (hourly_cap, daily_cap) = self.effective_caps();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::roll(&mut windows, now);

        if windows.day_count >= daily_cap {
            return Admission::Deny {
                reason: "daily quota",
                retry_after_secs: windows.day_start + DAY_SECS - now,
            };
        }
        if windows.hour_count >= hourly_cap {
            return Admission::Deny {
                reason: "hourly quota",
                retry_after_secs: windows.hour_start + HOUR_SECS - now,
            };
        }

        windows.hour_count += 1;
        windows.day_count += 1;
        Admission::Allow
    }

    /// Current (hour, day) counts without consuming quota.
    pub fn snapshot(&self) -> (u32, u32) {
        let now = self.clock.now_epoch();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::roll(&mut windows, now);
        (windows.hour_count, windows.day_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(clock, 30, 200)
    }

    #[test]
    fn thirtieth_succeeds_thirty_first_denies() {
        let clock = ManualClock::new(10 * HOUR_SECS);
        let limiter = limiter(clock);
        for _ in 0..30 {
            assert_eq!(limiter.admit(), Admission::Allow);
        }
        assert!(matches!(limiter.admit(), Admission::Deny { .. }));
    }

    #[test]
    fn denial_repeats_within_window_and_clears_at_rollover() {
        let clock = ManualClock::new(10 * HOUR_SECS);
        let limiter = RateLimiter::new(clock.clone(), 30, 200);
        for _ in 0..30 {
            limiter.admit();
        }
        assert!(matches!(limiter.admit(), Admission::Deny { .. }));
        assert!(matches!(limiter.admit(), Admission::Deny { .. }));

        clock.advance(HOUR_SECS);
        assert_eq!(limiter.admit(), Admission::Allow);
    }

    #[test]
    fn daily_cap_survives_hour_rollover() {
        let clock = ManualClock::new(0);
        let limiter = RateLimiter::new(clock.clone(), 1000, 200);
        for _ in 0..200 {
            assert_eq!(limiter.admit(), Admission::Allow);
        }
        clock.advance(HOUR_SECS);
        match limiter.admit() {
            Admission::Deny { reason, .. } => assert_eq!(reason, "daily quota"),
            Admission::Allow => panic!("daily cap should hold across hours"),
        }
        clock.advance(DAY_SECS);
        assert_eq!(limiter.admit(), Admission::Allow);
    }

    #[test]
    fn unsynced_clock_runs_at_quarter_cap() {
        let clock = ManualClock::unsynced();
        let limiter = RateLimiter::new(clock.clone(), 30, 200);
        for _ in 0..7 {
            assert_eq!(limiter.admit(), Admission::Allow);
        }
        assert!(matches!(limiter.admit(), Admission::Deny { .. }));

        clock.mark_synced();
        assert_eq!(limiter.admit(), Admission::Allow);
    }

    #[test]
    fn snapshot_reflects_admissions() {
        let clock = ManualClock::new(5 * HOUR_SECS);
        let limiter = limiter(clock);
        limiter.admit();
        limiter.admit();
        assert_eq!(limiter.snapshot(), (2, 2));
    }

    #[test]
    fn denial_message_rounds_minutes_up() {
        let admission = Admission::Deny {
            reason: "hourly quota",
            retry_after_secs: 13 * 60 + 1,
        };
        assert_eq!(
            admission.user_message().unwrap(),
            "Quota reached, try again in 14 min"
        );
    }
}
