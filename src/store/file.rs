use super::{MAX_ENTRIES_PER_NAMESPACE, Namespace, Store, check_key, check_value};
use crate::error::StoreError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type Partition = BTreeMap<String, String>;

/// File-backed store: one JSON partition file per namespace, the whole
/// partition rewritten and fsynced on every mutation. Mutations go through a
/// temp file and an atomic rename so a power cut leaves either the old or
/// the new partition, never a torn one.
pub struct FileStore {
    root: PathBuf,
    partitions: Mutex<BTreeMap<Namespace, Partition>>,
}

impl FileStore {
    /// Open (or create) the store under `root`. An unparseable partition
    /// file is reported as [`StoreError::Corrupted`]; the caller decides
    /// whether that drops the runtime into safe mode.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut partitions = BTreeMap::new();
        for ns in Namespace::ALL {
            let path = root.join(ns.partition()).with_extension("json");
            let partition = if path.exists() {
                let raw = fs::read_to_string(&path)?;
                serde_json::from_str::<Partition>(&raw).map_err(|e| {
                    StoreError::Corrupted(format!("{}: {e}", path.display()))
                })?
            } else {
                Partition::new()
            };
            partitions.insert(ns, partition);
        }

        Ok(Self {
            root,
            partitions: Mutex::new(partitions),
        })
    }

    fn partition_path(&self, ns: Namespace) -> PathBuf {
        self.root.join(ns.partition()).with_extension("json")
    }

    fn persist(&self, ns: Namespace, partition: &Partition) -> Result<(), StoreError> {
        let path = self.partition_path(ns);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_string(partition)
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;

        let mut file = fs::File::create(&tmp)?;
        file.write_all(raw.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, BTreeMap<Namespace, Partition>> {
        self.partitions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Store for FileStore {
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

        let previous = partition.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(ns, partition) {
            // Roll back the in-memory view so it keeps matching the flash.
            match previous {
                Some(old) => partition.insert(key.to_string(), old),
                None => partition.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        check_key(ns, key)?;

        let mut partitions = self.locked();
        let partition = partitions.entry(ns).or_default();
        let Some(previous) = partition.remove(key) else {
            return Err(StoreError::NotFound);
        };
        if let Err(e) = self.persist(ns, partition) {
            partition.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn iterate(&self, ns: Namespace) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .locked()
            .get(&ns)
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put(Namespace::UserMemory, "wifi", "office-24g").unwrap();
        assert_eq!(store.get(Namespace::UserMemory, "wifi").unwrap(), "office-24g");

        store.delete(Namespace::UserMemory, "wifi").unwrap();
        assert!(matches!(
            store.get(Namespace::UserMemory, "wifi"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put(Namespace::Boot, "count", "2").unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(Namespace::Boot, "count").unwrap(), "2");
    }

    #[test]
    fn corrupted_partition_detected_at_open() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put(Namespace::Scheduler, "count", "1").unwrap();
        }
        fs::write(dir.path().join("scheduler.json"), "{not json").unwrap();

        assert!(matches!(
            FileStore::open(dir.path()),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn entry_cap_reports_capacity_exceeded() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for i in 0..MAX_ENTRIES_PER_NAMESPACE {
            store
                .put(Namespace::UserMemory, &format!("k{i}"), "v")
                .unwrap();
        }
        assert!(matches!(
            store.put(Namespace::UserMemory, "overflow", "v"),
            Err(StoreError::CapacityExceeded(_))
        ));
        // Replacing an existing entry is still allowed at the cap.
        store.put(Namespace::UserMemory, "k0", "v2").unwrap();
    }

    #[test]
    fn namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put(Namespace::UserMemory, "key", "memory").unwrap();
        store.put(Namespace::ChatConfig, "key", "chat").unwrap();

        assert_eq!(store.get(Namespace::UserMemory, "key").unwrap(), "memory");
        assert_eq!(store.get(Namespace::ChatConfig, "key").unwrap(), "chat");
        assert_eq!(store.iterate(Namespace::UserMemory).unwrap().len(), 1);
    }
}
