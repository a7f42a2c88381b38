//! Versioned cache generations and the storage seam behind them.
//!
//! Each resource role gets exactly one named cache per version; stale
//! generations are wiped wholesale on activation rather than entry by
//! entry. There is no per-entry TTL — staleness is generation-based.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use thiserror::Error;

use crate::fetch::FetchResponse;

/// The resource role a cache generation serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
    Static,
    Dynamic,
    Image,
    Api,
}

impl CacheRole {
    pub const ALL: [Self; 4] = [Self::Static, Self::Dynamic, Self::Image, Self::Api];

    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Image => "images",
            Self::Api => "api",
        }
    }
}

/// Name of the current cache generation for a role
#[must_use]
pub fn cache_name(version: &str, role: CacheRole) -> String {
    format!("gather-{}-{version}", role.suffix())
}

/// A stored response plus its insertion time
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub response: FetchResponse,
    pub stored_at: SystemTime,
}

impl CachedEntry {
    #[must_use]
    pub fn new(response: FetchResponse) -> Self {
        Self {
            response,
            stored_at: SystemTime::now(),
        }
    }
}

#[derive(Debug, Error)]
#[error("cache storage failure: {0}")]
pub struct CacheError(pub String);

/// Storage seam behind the router's named caches.
///
/// An in-memory implementation stands in for the platform cache API;
/// operations are individually atomic, concurrent writers to the same
/// key are last-write-wins.
pub trait CacheStorage: Send + Sync {
    fn put(&self, cache: &str, key: &str, entry: CachedEntry) -> Result<(), CacheError>;
    fn get(&self, cache: &str, key: &str) -> Result<Option<CachedEntry>, CacheError>;
    /// Every cache that currently holds at least one entry
    fn cache_names(&self) -> Result<Vec<String>, CacheError>;
    /// Returns whether the cache existed
    fn delete_cache(&self, cache: &str) -> Result<bool, CacheError>;
    /// Entries across all caches
    fn entry_count(&self) -> Result<usize, CacheError>;
}

#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, HashMap<String, CachedEntry>>>,
}

impl MemoryCacheStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(_: impl std::fmt::Debug) -> CacheError {
    CacheError("cache lock poisoned".to_string())
}

impl CacheStorage for MemoryCacheStorage {
    fn put(&self, cache: &str, key: &str, entry: CachedEntry) -> Result<(), CacheError> {
        let mut caches = self.caches.write().map_err(poisoned)?;
        caches
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn get(&self, cache: &str, key: &str) -> Result<Option<CachedEntry>, CacheError> {
        let caches = self.caches.read().map_err(poisoned)?;
        Ok(caches
            .get(cache)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        let caches = self.caches.read().map_err(poisoned)?;
        Ok(caches.keys().cloned().collect())
    }

    fn delete_cache(&self, cache: &str) -> Result<bool, CacheError> {
        let mut caches = self.caches.write().map_err(poisoned)?;
        Ok(caches.remove(cache).is_some())
    }

    fn entry_count(&self) -> Result<usize, CacheError> {
        let caches = self.caches.read().map_err(poisoned)?;
        Ok(caches.values().map(HashMap::len).sum())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn generation_names_carry_role_and_version() {
        assert_eq!(cache_name("v3", CacheRole::Static), "gather-static-v3");
        assert_eq!(cache_name("v3", CacheRole::Image), "gather-images-v3");
        let names: Vec<String> = CacheRole::ALL
            .iter()
            .map(|role| cache_name("v1", *role))
            .collect();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn put_get_overwrite_roundtrip() {
        let storage = MemoryCacheStorage::new();
        let key = "https://example.com/app.js";
        assert!(storage.get("c", key).unwrap().is_none());

        storage
            .put("c", key, CachedEntry::new(FetchResponse::ok("text/javascript", "v1")))
            .unwrap();
        storage
            .put("c", key, CachedEntry::new(FetchResponse::ok("text/javascript", "v2")))
            .unwrap();

        let entry = storage.get("c", key).unwrap().unwrap();
        assert_eq!(entry.response.body, b"v2");
        assert_eq!(storage.entry_count().unwrap(), 1);
    }

    #[test]
    fn delete_cache_reports_existence() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("old", "k", CachedEntry::new(FetchResponse::empty_ok()))
            .unwrap();
        assert!(storage.delete_cache("old").unwrap());
        assert!(!storage.delete_cache("old").unwrap());
        assert_eq!(storage.cache_names().unwrap().len(), 0);
    }
}
