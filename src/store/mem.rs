use super::{MAX_ENTRIES_PER_NAMESPACE, Namespace, Store, check_key, check_value};
use crate::error::StoreError;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory store with the same limits as [`super::FileStore`]. Used by
/// tests and by ephemeral runs without a data directory.
#[derive(Default)]
pub struct MemStore {
    partitions: Mutex<BTreeMap<Namespace, BTreeMap<String, String>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<Namespace, BTreeMap<String, String>>> {
        self.partitions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Store for MemStore {
    fn get(&self, ns: Namespace, key: &str) -> Result<String, StoreError> {
        check_key(ns, key)?;
        self.locked()
            .get(&ns)
            .and_then(|p| p.get(key))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn put(&self, ns: Namespace, key: &str, value: &str) -> Result<(), StoreError> {
        check_key(ns, key)?;
        check_value(value)?;

        let mut partitions = self.locked();
        let partition = partitions.entry(ns).or_default();
        if !partition.contains_key(key) && partition.len() >= MAX_ENTRIES_PER_NAMESPACE {
            return Err(StoreError::CapacityExceeded(format!(
                "namespace {} holds {MAX_ENTRIES_PER_NAMESPACE} entries",
                ns.prefix()
            )));
        }
        partition.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        check_key(ns, key)?;
        self.locked()
            .entry(ns)
            .or_default()
            .remove(key)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn iterate(&self, ns: Namespace) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .locked()
            .get(&ns)
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
