use super::traits::{Tool, ToolResult};
use super::user_tools::UserToolSet;
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;

/// `create_tool`: register a user-defined directive the LLM can call later.
pub struct CreateToolTool {
    user_tools: Arc<UserToolSet>,
    /// Built-in names are immutable and may not be shadowed.
    reserved: HashSet<String>,
}

impl CreateToolTool {
    pub fn new(user_tools: Arc<UserToolSet>, reserved: Vec<String>) -> Self {
        Self {
            user_tools,
            reserved: reserved.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Tool for CreateToolTool {
    fn name(&self) -> &str {
        "create_tool"
    }

    fn description(&self) -> &str {
        "Define a new named tool from a plain-language action"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "1-32 chars of letters, digits, underscore"},
                "description": {"type": "string"},
                "action": {"type": "string", "description": "What to do when the tool is called"},
                "replace": {"type": "boolean", "description": "Replace an existing tool of the same name"}
            },
            "required": ["name", "description", "action"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let (Some(name), Some(description), Some(action)) = (
            args["name"].as_str(),
            args["description"].as_str(),
            args["action"].as_str(),
        ) else {
            return ToolResult::err("Error: 'name', 'description' and 'action' required (strings)");
        };
        let replace = args["replace"].as_bool().unwrap_or(false);

        if self.reserved.contains(name) {
            return ToolResult::err(format!("Error: '{name}' is a built-in tool"));
        }

        match self.user_tools.create(name, description, action, replace) {
            Ok(()) => ToolResult::ok(format!("Created tool '{name}': {description}")),
            Err(ToolError::DuplicateName { .. }) => ToolResult::err(format!(
                "Error: tool '{name}' already exists (pass replace=true to update)"
            )),
            Err(e) => ToolResult::err(format!("Error: {e}")),
        }
    }
}

pub struct ListUserToolsTool {
    user_tools: Arc<UserToolSet>,
}

impl ListUserToolsTool {
    pub fn new(user_tools: Arc<UserToolSet>) -> Self {
        Self { user_tools }
    }
}

#[async_trait]
impl Tool for ListUserToolsTool {
    fn name(&self) -> &str {
        "list_user_tools"
    }

    fn description(&self) -> &str {
        "List user-defined tools"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        let tools = self.user_tools.list();
        if tools.is_empty() {
            return ToolResult::ok("No user tools defined");
        }
        let lines: Vec<String> = tools
            .iter()
            .map(|def| format!("{}: {}", def.name, def.description))
            .collect();
        ToolResult::ok(lines.join("; "))
    }
}

pub struct DeleteUserToolTool {
    user_tools: Arc<UserToolSet>,
    reserved: HashSet<String>,
}

impl DeleteUserToolTool {
    pub fn new(user_tools: Arc<UserToolSet>, reserved: Vec<String>) -> Self {
        Self {
            user_tools,
            reserved: reserved.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Tool for DeleteUserToolTool {
    fn name(&self) -> &str {
        "delete_user_tool"
    }

    fn description(&self) -> &str {
        "Delete a user-defined tool by name"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(name) = args["name"].as_str() else {
            return ToolResult::err("Error: 'name' required");
        };
        if self.reserved.contains(name) {
            return ToolResult::err(format!(
                "Error: {}",
                ToolError::Immutable {
                    name: name.to_string()
                }
            ));
        }
        if self.user_tools.delete(name) {
            ToolResult::ok(format!("Deleted tool '{name}'"))
        } else {
            ToolResult::ok(format!("Tool '{name}' not found"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn user_tools() -> Arc<UserToolSet> {
        Arc::new(UserToolSet::load(Arc::new(MemStore::new())))
    }

    #[tokio::test]
    async fn create_list_delete_flow() {
        let set = user_tools();
        let create = CreateToolTool::new(Arc::clone(&set), vec!["gpio_set".into()]);
        let list = ListUserToolsTool::new(Arc::clone(&set));
        let delete = DeleteUserToolTool::new(Arc::clone(&set), vec!["gpio_set".into()]);

        let result = create
            .execute(json!({
                "name": "water_plants",
                "description": "Water the plants",
                "action": "Set gpio 5 high for ten seconds, then low"
            }))
            .await;
        assert_eq!(result.output, "Created tool 'water_plants': Water the plants");

        let result = list.execute(json!({})).await;
        assert_eq!(result.output, "water_plants: Water the plants");

        let result = delete.execute(json!({"name": "water_plants"})).await;
        assert_eq!(result.output, "Deleted tool 'water_plants'");
        assert_eq!(list.execute(json!({})).await.output, "No user tools defined");
    }

    #[tokio::test]
    async fn builtin_names_are_reserved() {
        let set = user_tools();
        let create = CreateToolTool::new(Arc::clone(&set), vec!["gpio_set".into()]);
        let delete = DeleteUserToolTool::new(set, vec!["gpio_set".into()]);

        let result = create
            .execute(json!({"name": "gpio_set", "description": "d", "action": "a"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("built-in"));

        let result = delete.execute(json!({"name": "gpio_set"})).await;
        assert!(!result.success);
        assert!(result.output.contains("immutable"));
    }

    #[tokio::test]
    async fn duplicate_mentions_replace_flag() {
        let set = user_tools();
        let create = CreateToolTool::new(set, Vec::new());
        create
            .execute(json!({"name": "t", "description": "one", "action": "a"}))
            .await;
        let result = create
            .execute(json!({"name": "t", "description": "two", "action": "b"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("replace=true"));

        let result = create
            .execute(json!({"name": "t", "description": "two", "action": "b", "replace": true}))
            .await;
        assert!(result.success);
    }
}
