mod gpio;
mod i2c;
mod lifecycle;
mod memory;
mod registry;
mod schedule;
pub mod schema;
mod system;
pub mod traits;
mod user_tools;

pub use registry::{Resolved, ToolRegistry};
pub use user_tools::{UserToolDef, UserToolSet};

use crate::clock::Clock;
use crate::config::{GpioPolicy, SharedTimezone};
use crate::hal::{GpioDriver, I2cBus};
use crate::ratelimit::RateLimiter;
use crate::scheduler::JobRepository;
use crate::store::Store;
use std::sync::Arc;

/// Everything the built-in tools need. Assembled once by the supervisor.
pub struct ToolDeps {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub limiter: Arc<RateLimiter>,
    pub timezone: Arc<SharedTimezone>,
    pub jobs: Arc<JobRepository>,
    pub gpio: Arc<dyn GpioDriver>,
    pub i2c: Arc<dyn I2cBus>,
    pub gpio_policy: GpioPolicy,
}

/// Build the full registry: every built-in plus the persisted user-tool
/// overlay.
pub fn build_registry(deps: &ToolDeps) -> Arc<ToolRegistry> {
    let user_tools = Arc::new(UserToolSet::load(Arc::clone(&deps.store)));
    let mut registry = ToolRegistry::new(Arc::clone(&user_tools));

    registry.register(Arc::new(gpio::GpioSetTool::new(
        Arc::clone(&deps.gpio),
        deps.gpio_policy.clone(),
    )));
    registry.register(Arc::new(i2c::I2cScanTool::new(
        Arc::clone(&deps.i2c),
        deps.gpio_policy.clone(),
    )));
    registry.register(Arc::new(memory::MemoryPutTool::new(Arc::clone(&deps.store))));
    registry.register(Arc::new(memory::MemoryGetTool::new(Arc::clone(&deps.store))));
    registry.register(Arc::new(memory::MemoryListTool::new(Arc::clone(&deps.store))));
    registry.register(Arc::new(memory::MemoryDeleteTool::new(Arc::clone(
        &deps.store,
    ))));
    registry.register(Arc::new(schedule::ScheduleCreateTool::new(
        Arc::clone(&deps.jobs),
        Arc::clone(&deps.clock),
    )));
    registry.register(Arc::new(schedule::ScheduleListTool::new(Arc::clone(
        &deps.jobs,
    ))));
    registry.register(Arc::new(schedule::ScheduleDeleteTool::new(Arc::clone(
        &deps.jobs,
    ))));
    registry.register(Arc::new(system::GetVersionTool));
    registry.register(Arc::new(system::GetHealthTool::new(
        Arc::clone(&deps.limiter),
        Arc::clone(&deps.clock),
        Arc::clone(&deps.timezone),
    )));
    registry.register(Arc::new(system::SetTimezoneTool::new(
        Arc::clone(&deps.store),
        Arc::clone(&deps.timezone),
    )));

    // The lifecycle tools guard every built-in name, their own included.
    let mut reserved = registry.builtin_names();
    reserved.extend([
        "create_tool".to_string(),
        "list_user_tools".to_string(),
        "delete_user_tool".to_string(),
    ]);
    registry.register(Arc::new(lifecycle::CreateToolTool::new(
        Arc::clone(&user_tools),
        reserved.clone(),
    )));
    registry.register(Arc::new(lifecycle::ListUserToolsTool::new(Arc::clone(
        &user_tools,
    ))));
    registry.register(Arc::new(lifecycle::DeleteUserToolTool::new(
        user_tools, reserved,
    )));

    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hal::{SimGpio, SimI2c};
    use crate::store::MemStore;
    use chrono_tz::Tz;

    pub(crate) fn test_deps() -> ToolDeps {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock = ManualClock::new(1_700_000_000);
        let timezone = Arc::new(SharedTimezone::new(Tz::UTC));
        ToolDeps {
            jobs: Arc::new(JobRepository::new(
                Arc::clone(&store),
                Arc::clone(&timezone),
            )),
            limiter: Arc::new(RateLimiter::new(clock.clone(), 30, 200)),
            clock,
            timezone,
            gpio: Arc::new(SimGpio::new()),
            i2c: Arc::new(SimI2c::new()),
            gpio_policy: GpioPolicy::default(),
            store,
        }
    }

    #[test]
    fn registry_holds_all_mandatory_builtins() {
        let registry = build_registry(&test_deps());
        let names = registry.builtin_names();
        for expected in [
            "gpio_set",
            "i2c_scan",
            "memory_put",
            "memory_get",
            "memory_list",
            "memory_delete",
            "schedule_create",
            "schedule_list",
            "schedule_delete",
            "get_version",
            "get_health",
            "set_timezone",
            "create_tool",
            "list_user_tools",
            "delete_user_tool",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn created_user_tool_resolves_through_registry() {
        let registry = build_registry(&test_deps());
        let Some(Resolved::Builtin(create)) = registry.resolve("create_tool") else {
            panic!("create_tool must be registered");
        };
        let result = create
            .execute(serde_json::json!({
                "name": "beep", "description": "Beep", "action": "Pulse pin 4"
            }))
            .await;
        assert!(result.success, "{}", result.output);

        match registry.resolve("beep") {
            Some(Resolved::User(def)) => assert_eq!(def.action, "Pulse pin 4"),
            _ => panic!("user tool should resolve"),
        }
        assert!(registry.specs().iter().any(|spec| spec.name == "beep"));
    }
}
