use super::traits::{Tool, ToolResult};
use crate::clock::Clock;
use crate::error::ScheduleError;
use crate::scheduler::{JobKind, JobRepository, parse_trigger};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct ScheduleCreateTool {
    repo: Arc<JobRepository>,
    clock: Arc<dyn Clock>,
}

impl ScheduleCreateTool {
    pub fn new(repo: Arc<JobRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }
}

#[async_trait]
impl Tool for ScheduleCreateTool {
    fn name(&self) -> &str {
        "schedule_create"
    }

    fn description(&self) -> &str {
        "Schedule an action: kind 'once' with 'in N minutes'/'at HH:MM', 'daily' with 'at HH:MM', or 'every' with 'N minutes'"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": {"type": "string", "description": "once | daily | every"},
                "spec": {"type": "string", "description": "e.g. 'in 5 minutes', 'at 08:15', '10 minutes'"},
                "action": {"type": "string", "description": "What to do when the job fires"}
            },
            "required": ["kind", "spec", "action"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let (Some(kind), Some(spec), Some(action)) = (
            args["kind"].as_str(),
            args["spec"].as_str(),
            args["action"].as_str(),
        ) else {
            return ToolResult::err("Error: 'kind', 'spec' and 'action' required (strings)");
        };
        if !self.clock.is_synced() {
            return ToolResult::err(format!(
                "Error: {}, cannot schedule yet",
                ScheduleError::ClockNotSynced
            ));
        }

        let trigger = match parse_trigger(kind, spec) {
            Ok(trigger) => trigger,
            Err(e) => return ToolResult::err(format!("Error: {e}")),
        };
        match self.repo.create(&trigger, action, self.clock.now_epoch()) {
            Ok(job) => ToolResult::ok(format!(
                "Scheduled job {} ({:?}), next fire at epoch {}",
                job.id, job.kind, job.next_fire_epoch
            )),
            Err(e) => ToolResult::err(format!("Error: {e}")),
        }
    }
}

pub struct ScheduleListTool {
    repo: Arc<JobRepository>,
}

impl ScheduleListTool {
    pub fn new(repo: Arc<JobRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Tool for ScheduleListTool {
    fn name(&self) -> &str {
        "schedule_list"
    }

    fn description(&self) -> &str {
        "List scheduled jobs"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        let jobs = self.repo.list();
        if jobs.is_empty() {
            return ToolResult::ok("No scheduled jobs");
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|job| {
                let kind = match job.kind {
                    JobKind::Once => "once",
                    JobKind::Daily => "daily",
                    JobKind::Periodic => "periodic",
                };
                format!(
                    "#{} {kind}{} next={}: {}",
                    job.id,
                    if job.active { "" } else { " (done)" },
                    job.next_fire_epoch,
                    job.action
                )
            })
            .collect();
        ToolResult::ok(lines.join("; "))
    }
}

pub struct ScheduleDeleteTool {
    repo: Arc<JobRepository>,
}

impl ScheduleDeleteTool {
    pub fn new(repo: Arc<JobRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Tool for ScheduleDeleteTool {
    fn name(&self) -> &str {
        "schedule_delete"
    }

    fn description(&self) -> &str {
        "Delete a scheduled job by id"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "required": ["id"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(id) = args["id"].as_i64().and_then(|v| u32::try_from(v).ok()) else {
            return ToolResult::err("Error: 'id' required (number)");
        };
        match self.repo.delete(id) {
            Ok(()) => ToolResult::ok(format!("Deleted job {id}")),
            Err(ScheduleError::NotFound(_)) => ToolResult::ok(format!("Job {id} not found")),
            Err(e) => ToolResult::err(format!("Error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SharedTimezone;
    use crate::store::MemStore;
    use chrono_tz::Tz;

    fn repo() -> Arc<JobRepository> {
        Arc::new(JobRepository::new(
            Arc::new(MemStore::new()),
            Arc::new(SharedTimezone::new(Tz::UTC)),
        ))
    }

    #[tokio::test]
    async fn create_list_delete_flow() {
        let repo = repo();
        let clock = ManualClock::new(1000);
        let create = ScheduleCreateTool::new(Arc::clone(&repo), clock);
        let list = ScheduleListTool::new(Arc::clone(&repo));
        let delete = ScheduleDeleteTool::new(Arc::clone(&repo));

        let result = create
            .execute(json!({"kind": "once", "spec": "in 5 minutes", "action": "water plants"}))
            .await;
        assert!(result.success, "{}", result.output);
        assert!(result.output.contains("Scheduled job 1"));
        assert!(result.output.contains("1300"));

        let result = list.execute(json!({})).await;
        assert!(result.output.contains("#1 once"));
        assert!(result.output.contains("water plants"));

        let result = delete.execute(json!({"id": 1})).await;
        assert_eq!(result.output, "Deleted job 1");
        assert_eq!(list.execute(json!({})).await.output, "No scheduled jobs");
    }

    #[tokio::test]
    async fn create_refused_while_clock_unsynced() {
        let clock = ManualClock::unsynced();
        let create = ScheduleCreateTool::new(repo(), clock);
        let result = create
            .execute(json!({"kind": "once", "spec": "in 5 minutes", "action": "x"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("clock not synced"));
    }

    #[tokio::test]
    async fn bad_spec_surfaces_grammar_error() {
        let create = ScheduleCreateTool::new(repo(), ManualClock::new(0));
        let result = create
            .execute(json!({"kind": "once", "spec": "whenever", "action": "x"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("unrecognized schedule spec"));
    }

    #[tokio::test]
    async fn delete_missing_job_is_not_an_error_turn() {
        let delete = ScheduleDeleteTool::new(repo());
        let result = delete.execute(json!({"id": 42})).await;
        assert!(result.success);
        assert_eq!(result.output, "Job 42 not found");
    }
}
