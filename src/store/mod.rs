mod file;
mod mem;

pub use file::FileStore;
pub use mem::MemStore;

use crate::error::StoreError;

/// Per-namespace entry cap, mirroring the small NVS partition of the device.
pub const MAX_ENTRIES_PER_NAMESPACE: usize = 256;

/// Largest value a single entry may hold.
pub const MAX_VALUE_BYTES: usize = 4096;

/// Full keys (prefix + suffix) are limited to 15 ascii bytes.
pub const MAX_KEY_BYTES: usize = 15;

/// Namespaces of the persistent store. The prefix forms part of the on-flash
/// key, so suffixes stay short (see [`MAX_KEY_BYTES`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// User-visible memory entries written by the memory tools.
    UserMemory,
    /// Chat channel configuration and poller state.
    ChatConfig,
    /// LLM provider configuration.
    LlmConfig,
    /// Scheduler job records and the id allocator.
    Scheduler,
    /// Active timezone.
    Timezone,
    /// Boot health counters.
    Boot,
    /// User-defined tool slots.
    UserTools,
}

impl Namespace {
    pub const ALL: [Namespace; 7] = [
        Namespace::UserMemory,
        Namespace::ChatConfig,
        Namespace::LlmConfig,
        Namespace::Scheduler,
        Namespace::Timezone,
        Namespace::Boot,
        Namespace::UserTools,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::UserMemory => "u_",
            Namespace::ChatConfig => "tc_",
            Namespace::LlmConfig => "cc_",
            Namespace::Scheduler => "cron_",
            Namespace::Timezone => "tz_",
            Namespace::Boot => "boot_",
            Namespace::UserTools => "ut_",
        }
    }

    /// Partition file name for the file-backed store.
    pub fn partition(self) -> &'static str {
        match self {
            Namespace::UserMemory => "user_memory",
            Namespace::ChatConfig => "chat_config",
            Namespace::LlmConfig => "llm_config",
            Namespace::Scheduler => "scheduler",
            Namespace::Timezone => "timezone",
            Namespace::Boot => "boot",
            Namespace::UserTools => "user_tools",
        }
    }
}

/// Namespaced string key-value store. Writes are durable before the call
/// returns. Values are UTF-8 text; every consumer in this runtime stores
/// either plain text or serialized JSON.
pub trait Store: Send + Sync {
    fn get(&self, ns: Namespace, key: &str) -> Result<String, StoreError>;

    fn put(&self, ns: Namespace, key: &str, value: &str) -> Result<(), StoreError>;

    fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError>;

    /// All entries of a namespace, sorted by key.
    fn iterate(&self, ns: Namespace) -> Result<Vec<(String, String)>, StoreError>;
}

/// Validate a key suffix against the on-flash limits for its namespace.
pub fn check_key(ns: Namespace, key: &str) -> Result<(), StoreError> {
    let full_len = ns.prefix().len() + key.len();
    if key.is_empty()
        || full_len > MAX_KEY_BYTES
        || !key.bytes().all(|b| b.is_ascii_graphic())
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub fn check_value(value: &str) -> Result<(), StoreError> {
    if value.len() > MAX_VALUE_BYTES {
        return Err(StoreError::CapacityExceeded(format!(
            "value of {} bytes exceeds {MAX_VALUE_BYTES}",
            value.len()
        )));
    }
    Ok(())
}
