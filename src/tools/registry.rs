use super::traits::{Tool, ToolSpec};
use super::user_tools::{UserToolDef, UserToolSet};
use std::collections::HashMap;
use std::sync::Arc;

/// What a name resolved to: a built-in handler, or a user-defined directive
/// the agent resolves in a sub-loop. The registry never executes user tools
/// itself; that would hand it a back-pointer into the agent.
pub enum Resolved {
    Builtin(Arc<dyn Tool>),
    User(UserToolDef),
}

/// Static table of built-in tools plus the late-bound user overlay. Built-ins
/// are registered once at wiring time and are immutable afterwards; on a name
/// clash the built-in wins.
pub struct ToolRegistry {
    builtins: HashMap<String, Arc<dyn Tool>>,
    user_tools: Arc<UserToolSet>,
}

impl ToolRegistry {
    pub fn new(user_tools: Arc<UserToolSet>) -> Self {
        Self {
            builtins: HashMap::new(),
            user_tools,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.builtins.insert(tool.name().to_string(), tool);
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn builtin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builtins.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        if let Some(tool) = self.builtins.get(name) {
            return Some(Resolved::Builtin(Arc::clone(tool)));
        }
        self.user_tools.get(name).map(Resolved::User)
    }

    /// The full tool manifest sent with each LLM request: built-ins in name
    /// order, then user tools.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.builtins.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs.extend(self.user_tools.specs());
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use crate::tools::traits::ToolResult;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: Value) -> ToolResult {
            ToolResult::ok(args["text"].as_str().unwrap_or_default())
        }
    }

    fn registry() -> ToolRegistry {
        let user_tools = Arc::new(UserToolSet::load(Arc::new(MemStore::new())));
        let mut registry = ToolRegistry::new(user_tools);
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[test]
    fn resolves_builtin() {
        let registry = registry();
        assert!(matches!(registry.resolve("echo"), Some(Resolved::Builtin(_))));
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn user_tools_appear_in_manifest() {
        let user_tools = Arc::new(UserToolSet::load(Arc::new(MemStore::new())));
        user_tools.create("beep", "Beep once", "Pulse pin 4", false).unwrap();
        let mut registry = ToolRegistry::new(Arc::clone(&user_tools));
        registry.register(Arc::new(EchoTool));

        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["echo", "beep"]);
        assert!(matches!(registry.resolve("beep"), Some(Resolved::User(_))));
    }

    #[test]
    fn builtin_wins_name_clash() {
        let user_tools = Arc::new(UserToolSet::load(Arc::new(MemStore::new())));
        user_tools.create("echo", "Shadowing", "nope", false).unwrap();
        let mut registry = ToolRegistry::new(user_tools);
        registry.register(Arc::new(EchoTool));

        assert!(matches!(registry.resolve("echo"), Some(Resolved::Builtin(_))));
    }
}
