//! Persistent key-value storage layer.
//!
//! String keys map to JSON-serialized values. Callers pick the backend once
//! at startup via [`open_kv_store`]: the SQLite backend when it can be
//! opened, otherwise a transparent in-memory fallback with the same
//! interface (data then does not survive a restart).

mod memory;
mod sqlite;

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

/// Storage interface shared by the persistent and in-memory backends
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, overwriting any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key` (missing keys are a no-op)
    fn remove(&self, key: &str) -> Result<()>;

    /// List every key starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Open the persistent store at `path`, falling back to memory on failure.
///
/// The probe happens exactly once; callers never need to branch on the
/// backend afterwards.
pub fn open_kv_store(path: impl AsRef<Path>) -> Arc<dyn KeyValueStore> {
    match SqliteKeyValueStore::open(path.as_ref()) {
        Ok(store) => Arc::new(store),
        Err(error) => {
            tracing::warn!(
                "Persistent storage unavailable ({error}), falling back to in-memory store; \
                 data will not survive a restart"
            );
            Arc::new(MemoryKeyValueStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_kv_store_falls_back_to_memory_on_bad_path() {
        let store = open_kv_store("/nonexistent-dir/definitely/not/here.db");
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn open_kv_store_uses_sqlite_when_path_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gather.db");
        {
            let store = open_kv_store(&path);
            store.set("k", "v").unwrap();
        }
        // A second open sees the persisted value
        let store = open_kv_store(&path);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
