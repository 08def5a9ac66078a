mod engine;
mod grammar;

pub use engine::run;
pub use grammar::{Trigger, parse_trigger};

use crate::config::SharedTimezone;
use crate::error::{ScheduleError, StoreError};
use crate::store::{Namespace, Store};
use chrono::{Days, LocalResult, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Byte cap for a job's action text.
pub const MAX_ACTION_BYTES: usize = 256;

const ID_ALLOCATOR_KEY: &str = "count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Once,
    Daily,
    Periodic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: u32,
    pub kind: JobKind,
    pub action: String,
    pub next_fire_epoch: i64,
    pub created_epoch: i64,
    pub active: bool,
    /// Daily jobs: local firing time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<u32>,
    /// Periodic jobs: seconds between firings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<i64>,
}

/// Durable job table in the `cron_` namespace: `cron_count` holds the last
/// allocated id (ids are monotonic; gaps from deletion are never reused),
/// `cron_<id>` holds one serialized job.
pub struct JobRepository {
    store: Arc<dyn Store>,
    timezone: Arc<SharedTimezone>,
}

impl JobRepository {
    pub fn new(store: Arc<dyn Store>, timezone: Arc<SharedTimezone>) -> Self {
        Self { store, timezone }
    }

    pub fn create(
        &self,
        trigger: &Trigger,
        action: &str,
        now: i64,
    ) -> Result<ScheduledJob, ScheduleError> {
        if action.is_empty() || action.len() > MAX_ACTION_BYTES {
            return Err(ScheduleError::BadSpec(format!(
                "action must be 1-{MAX_ACTION_BYTES} bytes"
            )));
        }

        let tz = self.timezone.get();
        let (kind, next_fire_epoch, hour, minute, interval_secs) = match *trigger {
            Trigger::OnceIn { seconds } => (JobKind::Once, now + seconds, None, None, None),
            Trigger::OnceAt { hour, minute } => (
                JobKind::Once,
                next_daily_occurrence(tz, hour, minute, now),
                None,
                None,
                None,
            ),
            Trigger::Daily { hour, minute } => (
                JobKind::Daily,
                next_daily_occurrence(tz, hour, minute, now),
                Some(hour),
                Some(minute),
                None,
            ),
            Trigger::Periodic { interval_secs } => (
                JobKind::Periodic,
                now + interval_secs,
                None,
                None,
                Some(interval_secs),
            ),
        };

        let job = ScheduledJob {
            id: self.allocate_id()?,
            kind,
            action: action.to_string(),
            next_fire_epoch,
            created_epoch: now,
            active: true,
            hour,
            minute,
            interval_secs,
        };
        self.persist(&job)?;
        Ok(job)
    }

    pub fn list(&self) -> Vec<ScheduledJob> {
        let Ok(entries) = self.store.iterate(Namespace::Scheduler) else {
            return Vec::new();
        };
        let mut jobs: Vec<ScheduledJob> = entries
            .into_iter()
            .filter(|(key, _)| key != ID_ALLOCATOR_KEY)
            .filter_map(|(key, raw)| match serde_json::from_str(&raw) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!("Skipping unreadable job record cron_{key}: {e}");
                    None
                }
            })
            .collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    pub fn get(&self, id: u32) -> Result<ScheduledJob, ScheduleError> {
        let raw = match self.store.get(Namespace::Scheduler, &id.to_string()) {
            Ok(raw) => raw,
            Err(StoreError::NotFound) => return Err(ScheduleError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| ScheduleError::Store(StoreError::Corrupted(e.to_string())))
    }

    pub fn delete(&self, id: u32) -> Result<(), ScheduleError> {
        match self.store.delete(Namespace::Scheduler, &id.to_string()) {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(ScheduleError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn due_jobs(&self, now: i64) -> Vec<ScheduledJob> {
        self.list()
            .into_iter()
            .filter(|job| job.active && job.next_fire_epoch <= now)
            .collect()
    }

    /// Advance a job after a successful firing and persist the mutation.
    pub fn mark_fired(&self, job: &ScheduledJob, now: i64) -> Result<(), ScheduleError> {
        let mut job = job.clone();
        match job.kind {
            JobKind::Once => {
                job.active = false;
            }
            JobKind::Daily => {
                let (hour, minute) = (job.hour.unwrap_or(0), job.minute.unwrap_or(0));
                job.next_fire_epoch = next_daily_occurrence(self.timezone.get(), hour, minute, now);
            }
            JobKind::Periodic => {
                let interval = job.interval_secs.unwrap_or(60).max(1);
                // Catch up over intervals missed while offline.
                while job.next_fire_epoch <= now {
                    job.next_fire_epoch += interval;
                }
            }
        }
        self.persist(&job)
    }

    fn allocate_id(&self) -> Result<u32, ScheduleError> {
        let last: u32 = self
            .store
            .get(Namespace::Scheduler, ID_ALLOCATOR_KEY)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let id = last + 1;
        self.store
            .put(Namespace::Scheduler, ID_ALLOCATOR_KEY, &id.to_string())?;
        Ok(id)
    }

    fn persist(&self, job: &ScheduledJob) -> Result<(), ScheduleError> {
        let raw = serde_json::to_string(job)
            .map_err(|e| ScheduleError::Store(StoreError::Corrupted(e.to_string())))?;
        self.store
            .put(Namespace::Scheduler, &job.id.to_string(), &raw)?;
        Ok(())
    }
}

/// Epoch of the next HH:MM occurrence strictly after `now` in local time.
/// Fall-back ambiguity resolves to the earlier instant; times inside a
/// spring-forward gap shift one hour later.
pub fn next_daily_occurrence(tz: Tz, hour: u32, minute: u32, now: i64) -> i64 {
    let Some(now_utc) = chrono::DateTime::from_timestamp(now, 0) else {
        return now + 86_400;
    };
    let today = now_utc.with_timezone(&tz).date_naive();

    for day_offset in 0..3 {
        let Some(date) = today.checked_add_days(Days::new(day_offset)) else {
            continue;
        };
        let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
            continue;
        };
        let resolved = match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(first, _) => Some(first),
            LocalResult::None => tz
                .from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest(),
        };
        if let Some(dt) = resolved {
            let epoch = dt.timestamp();
            if epoch > now {
                return epoch;
            }
        }
    }
    now + 86_400
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use chrono::NaiveDate;

    fn repo_with_tz(tz: Tz) -> JobRepository {
        JobRepository::new(
            Arc::new(MemStore::new()),
            Arc::new(SharedTimezone::new(tz)),
        )
    }

    fn local_epoch(tz: Tz, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        tz.from_local_datetime(
            &NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, 0)
                .unwrap(),
        )
        .earliest()
        .unwrap()
        .timestamp()
    }

    #[test]
    fn ids_are_monotonic_and_skip_deleted() {
        let repo = repo_with_tz(Tz::UTC);
        let a = repo
            .create(&Trigger::OnceIn { seconds: 60 }, "ping", 1000)
            .unwrap();
        let b = repo
            .create(&Trigger::OnceIn { seconds: 60 }, "pong", 1000)
            .unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        repo.delete(b.id).unwrap();
        let c = repo
            .create(&Trigger::OnceIn { seconds: 60 }, "again", 1000)
            .unwrap();
        assert_eq!(c.id, 3);
    }

    #[test]
    fn once_job_deactivates_after_firing() {
        let repo = repo_with_tz(Tz::UTC);
        let job = repo
            .create(&Trigger::OnceIn { seconds: 30 }, "water plants", 1000)
            .unwrap();
        assert_eq!(job.next_fire_epoch, 1030);
        assert!(repo.due_jobs(1030).iter().any(|j| j.id == job.id));

        repo.mark_fired(&job, 1030).unwrap();
        assert!(repo.due_jobs(2000).is_empty());
        assert!(!repo.get(job.id).unwrap().active);
    }

    #[test]
    fn periodic_catches_up_past_missed_intervals() {
        let repo = repo_with_tz(Tz::UTC);
        let job = repo
            .create(&Trigger::Periodic { interval_secs: 300 }, "poll sensor", 0)
            .unwrap();
        assert_eq!(job.next_fire_epoch, 300);

        // Offline for ~an hour: the job fires once and lands on the first
        // boundary in the future.
        repo.mark_fired(&job, 3700).unwrap();
        let reloaded = repo.get(job.id).unwrap();
        assert_eq!(reloaded.next_fire_epoch, 3900);
        assert!(reloaded.active);
    }

    #[test]
    fn daily_job_recomputes_for_tomorrow() {
        let tz = Tz::UTC;
        let repo = repo_with_tz(tz);
        let now = local_epoch(tz, 2024, 6, 1, 9, 0);
        let job = repo
            .create(
                &Trigger::Daily {
                    hour: 8,
                    minute: 15,
                },
                "morning report",
                now,
            )
            .unwrap();
        assert_eq!(job.next_fire_epoch, local_epoch(tz, 2024, 6, 2, 8, 15));

        repo.mark_fired(&job, job.next_fire_epoch).unwrap();
        assert_eq!(
            repo.get(job.id).unwrap().next_fire_epoch,
            local_epoch(tz, 2024, 6, 3, 8, 15)
        );
    }

    #[test]
    fn daily_dst_fall_back_is_25_hours() {
        // Created 2024-11-02 09:00 local in Los Angeles; daily at 08:15.
        // The next 08:15 is on the 3rd, after the DST fall-back, so the two
        // 08:15s are 25 real hours apart.
        let tz = chrono_tz::America::Los_Angeles;
        let now = local_epoch(tz, 2024, 11, 2, 9, 0);
        let next = next_daily_occurrence(tz, 8, 15, now);

        let today_0815 = local_epoch(tz, 2024, 11, 2, 8, 15);
        assert_eq!(next - today_0815, 25 * 3600);
        assert_eq!(next, local_epoch(tz, 2024, 11, 3, 8, 15));
    }

    #[test]
    fn next_occurrence_is_today_when_still_ahead() {
        let tz = Tz::UTC;
        let now = local_epoch(tz, 2024, 6, 1, 7, 0);
        assert_eq!(
            next_daily_occurrence(tz, 8, 15, now),
            local_epoch(tz, 2024, 6, 1, 8, 15)
        );
    }

    #[test]
    fn spring_forward_gap_shifts_one_hour_later() {
        // 2024-03-10 02:30 does not exist in Los Angeles.
        let tz = chrono_tz::America::Los_Angeles;
        let now = local_epoch(tz, 2024, 3, 10, 0, 0);
        let next = next_daily_occurrence(tz, 2, 30, now);
        assert_eq!(next, local_epoch(tz, 2024, 3, 10, 3, 30));
    }

    #[test]
    fn jobs_survive_reload_through_store() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let timezone = Arc::new(SharedTimezone::new(Tz::UTC));
        {
            let repo = JobRepository::new(Arc::clone(&store), Arc::clone(&timezone));
            repo.create(&Trigger::Periodic { interval_secs: 600 }, "heartbeat", 100)
                .unwrap();
        }
        let repo = JobRepository::new(store, timezone);
        let jobs = repo.list();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].action, "heartbeat");
        assert_eq!(jobs[0].kind, JobKind::Periodic);
    }

    #[test]
    fn rejects_oversized_action() {
        let repo = repo_with_tz(Tz::UTC);
        let result = repo.create(
            &Trigger::OnceIn { seconds: 60 },
            &"a".repeat(MAX_ACTION_BYTES + 1),
            0,
        );
        assert!(matches!(result, Err(ScheduleError::BadSpec(_))));
    }
}
