use super::traits::{Tool, ToolResult};
use crate::error::StoreError;
use crate::store::{Namespace, Store};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

fn key_from(args: &Value) -> Result<&str, ToolResult> {
    args["key"]
        .as_str()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ToolResult::err("Error: 'key' required (string)"))
}

pub struct MemoryPutTool {
    store: Arc<dyn Store>,
}

impl MemoryPutTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryPutTool {
    fn name(&self) -> &str {
        "memory_put"
    }

    fn description(&self) -> &str {
        "Persist a note under a short key; survives reboot"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Short ascii key"},
                "value": {"type": "string"}
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let key = match key_from(&args) {
            Ok(key) => key,
            Err(result) => return result,
        };
        let Some(value) = args["value"].as_str() else {
            return ToolResult::err("Error: 'value' required (string)");
        };

        match self.store.put(Namespace::UserMemory, key, value) {
            Ok(()) => ToolResult::ok(format!("Remembered '{key}'")),
            Err(StoreError::InvalidKey(_)) => {
                ToolResult::err("Error: key must be ascii, at most 13 chars")
            }
            Err(e) => ToolResult::err(format!("Error: {e}")),
        }
    }
}

pub struct MemoryGetTool {
    store: Arc<dyn Store>,
}

impl MemoryGetTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryGetTool {
    fn name(&self) -> &str {
        "memory_get"
    }

    fn description(&self) -> &str {
        "Recall a note previously stored with memory_put"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let key = match key_from(&args) {
            Ok(key) => key,
            Err(result) => return result,
        };
        match self.store.get(Namespace::UserMemory, key) {
            Ok(value) => ToolResult::ok(format!("{key} = {value}")),
            Err(StoreError::NotFound) => ToolResult::ok(format!("No memory for '{key}'")),
            Err(e) => ToolResult::err(format!("Error: {e}")),
        }
    }
}

pub struct MemoryListTool {
    store: Arc<dyn Store>,
}

impl MemoryListTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryListTool {
    fn name(&self) -> &str {
        "memory_list"
    }

    fn description(&self) -> &str {
        "List all stored memory keys"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        match self.store.iterate(Namespace::UserMemory) {
            Ok(entries) if entries.is_empty() => ToolResult::ok("No memories stored"),
            Ok(entries) => {
                let keys: Vec<String> = entries.into_iter().map(|(k, _)| k).collect();
                ToolResult::ok(format!("Keys: {}", keys.join(", ")))
            }
            Err(e) => ToolResult::err(format!("Error: {e}")),
        }
    }
}

pub struct MemoryDeleteTool {
    store: Arc<dyn Store>,
}

impl MemoryDeleteTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryDeleteTool {
    fn name(&self) -> &str {
        "memory_delete"
    }

    fn description(&self) -> &str {
        "Forget a stored note"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let key = match key_from(&args) {
            Ok(key) => key,
            Err(result) => return result,
        };
        match self.store.delete(Namespace::UserMemory, key) {
            Ok(()) => ToolResult::ok(format!("Forgot '{key}'")),
            Err(StoreError::NotFound) => ToolResult::ok(format!("No memory for '{key}'")),
            Err(e) => ToolResult::err(format!("Error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn store() -> Arc<dyn Store> {
        Arc::new(MemStore::new())
    }

    #[tokio::test]
    async fn put_get_list_delete_cycle() {
        let store = store();
        let put = MemoryPutTool::new(Arc::clone(&store));
        let get = MemoryGetTool::new(Arc::clone(&store));
        let list = MemoryListTool::new(Arc::clone(&store));
        let delete = MemoryDeleteTool::new(Arc::clone(&store));

        let result = put
            .execute(json!({"key": "wifi", "value": "office-24g"}))
            .await;
        assert!(result.success);

        let result = get.execute(json!({"key": "wifi"})).await;
        assert_eq!(result.output, "wifi = office-24g");

        let result = list.execute(json!({})).await;
        assert_eq!(result.output, "Keys: wifi");

        let result = delete.execute(json!({"key": "wifi"})).await;
        assert_eq!(result.output, "Forgot 'wifi'");

        let result = get.execute(json!({"key": "wifi"})).await;
        assert_eq!(result.output, "No memory for 'wifi'");
    }

    #[tokio::test]
    async fn oversized_key_rejected_with_limit() {
        let put = MemoryPutTool::new(store());
        let result = put
            .execute(json!({"key": "much_too_long_key", "value": "v"}))
            .await;
        assert!(!result.success);
        assert_eq!(result.output, "Error: key must be ascii, at most 13 chars");
    }

    #[tokio::test]
    async fn empty_list_reports_none() {
        let list = MemoryListTool::new(store());
        let result = list.execute(json!({})).await;
        assert_eq!(result.output, "No memories stored");
    }
}
