use super::traits::{ToolSpec, is_valid_tool_name};
use crate::error::ToolError;
use crate::store::{Namespace, Store};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Slot cap for user-defined tools; store keys are `ut_0`..`ut_15`.
pub const MAX_USER_TOOLS: usize = 16;

/// Byte cap for a user tool's action text.
pub const MAX_ACTION_BYTES: usize = 256;

/// A user-defined tool: a named directive the LLM can invoke. The action
/// text is resolved at call time by re-submitting it as a user-level
/// directive inside a fresh bounded loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserToolDef {
    pub name: String,
    pub description: String,
    pub action: String,
    #[serde(skip)]
    slot: usize,
}

impl UserToolDef {
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }
}

/// The persisted overlay of user-defined tools. Loaded once at startup;
/// every mutation writes through to the store before it is visible.
pub struct UserToolSet {
    store: Arc<dyn Store>,
    tools: Mutex<HashMap<String, UserToolDef>>,
}

impl UserToolSet {
    pub fn load(store: Arc<dyn Store>) -> Self {
        let mut tools = HashMap::new();
        if let Ok(entries) = store.iterate(Namespace::UserTools) {
            for (key, raw) in entries {
                let Ok(slot) = key.parse::<usize>() else {
                    tracing::warn!("Skipping user tool with bad slot key '{key}'");
                    continue;
                };
                match serde_json::from_str::<UserToolDef>(&raw) {
                    Ok(mut def) => {
                        def.slot = slot;
                        tools.insert(def.name.clone(), def);
                    }
                    Err(e) => {
                        tracing::warn!("Skipping unreadable user tool in slot {slot}: {e}");
                    }
                }
            }
        }
        Self {
            store,
            tools: Mutex::new(tools),
        }
    }

    pub fn create(
        &self,
        name: &str,
        description: &str,
        action: &str,
        replace: bool,
    ) -> Result<(), ToolError> {
        if !is_valid_tool_name(name) {
            return Err(ToolError::InvalidArguments {
                name: "create_tool".into(),
                reason: "name must be 1-32 chars of [A-Za-z0-9_]".into(),
            });
        }
        if action.len() > MAX_ACTION_BYTES {
            return Err(ToolError::InvalidArguments {
                name: "create_tool".into(),
                reason: format!("action exceeds {MAX_ACTION_BYTES} bytes"),
            });
        }

        let mut tools = self.locked();
        let slot = match tools.get(name) {
            Some(existing) if replace => existing.slot,
            Some(_) => {
                return Err(ToolError::DuplicateName {
                    name: name.to_string(),
                });
            }
            None => {
                if tools.len() >= MAX_USER_TOOLS {
                    return Err(ToolError::Failed {
                        name: "create_tool".into(),
                        detail: format!("user tool limit of {MAX_USER_TOOLS} reached"),
                    });
                }
                let used: Vec<usize> = tools.values().map(|t| t.slot).collect();
                (0..MAX_USER_TOOLS)
                    .find(|slot| !used.contains(slot))
                    .expect("a free slot exists below the cap")
            }
        };

        let def = UserToolDef {
            name: name.to_string(),
            description: description.to_string(),
            action: action.to_string(),
            slot,
        };
        let raw = serde_json::to_string(&def).map_err(|e| ToolError::Failed {
            name: "create_tool".into(),
            detail: e.to_string(),
        })?;
        self.store
            .put(Namespace::UserTools, &slot.to_string(), &raw)
            .map_err(|e| ToolError::Failed {
                name: "create_tool".into(),
                detail: e.to_string(),
            })?;

        tools.insert(def.name.clone(), def);
        Ok(())
    }

    /// Returns whether the tool existed.
    pub fn delete(&self, name: &str) -> bool {
        let mut tools = self.locked();
        let Some(def) = tools.remove(name) else {
            return false;
        };
        if let Err(e) = self.store.delete(Namespace::UserTools, &def.slot.to_string()) {
            tracing::warn!("Failed to delete user tool '{name}' from store: {e}");
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<UserToolDef> {
        self.locked().get(name).cloned()
    }

    pub fn list(&self) -> Vec<UserToolDef> {
        let mut list: Vec<UserToolDef> = self.locked().values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.list().iter().map(UserToolDef::spec).collect()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HashMap<String, UserToolDef>> {
        self.tools
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
