// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Key-value store with typed operations.
//!
//! Models the shared persisted store that every execution context of a
//! user's data reads and writes:
//! - values are JSON-serialized under string keys (see [`crate::store::keys`])
//! - mutations go through a single writer lock, so a read-modify-write of
//!   one key can never race another writer and silently drop an award
//! - every successful mutation is emitted on a change feed that other
//!   contexts watch (the cross-tab signal)
//!
//! Durability is an optional JSON snapshot file. The snapshot containing
//! the new value is written before the in-memory commit: a persistence
//! failure surfaces as `Persistence` with no partial state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::store::keys;

const CHANGE_FEED_CAPACITY: usize = 256;

/// A single key change, as observed by other execution contexts.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub key: String,
}

struct Inner {
    entries: DashMap<String, Value>,
    /// Serializes all mutations. Reads stay lock-free on the map.
    write_lock: Mutex<()>,
    snapshot_path: Option<PathBuf>,
    changes: broadcast::Sender<StoreChange>,
}

/// Shared key-value store.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<Inner>,
}

impl KvStore {
    /// Open a store backed by a JSON snapshot file.
    ///
    /// The snapshot is loaded if present; a missing file starts empty.
    pub fn open(path: &str) -> Result<Self, AppError> {
        let store = Self::build(Some(PathBuf::from(path)));

        match std::fs::read(path) {
            Ok(bytes) => {
                let map: BTreeMap<String, Value> = serde_json::from_slice(&bytes)
                    .map_err(|e| AppError::Persistence(format!("corrupt snapshot: {}", e)))?;
                let count = map.len();
                for (k, v) in map {
                    store.inner.entries.insert(k, v);
                }
                tracing::info!(path, entries = count, "Loaded reward store snapshot");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path, "No snapshot found, starting with empty store");
            }
            Err(e) => {
                return Err(AppError::Persistence(format!(
                    "failed to read snapshot {}: {}",
                    path, e
                )));
            }
        }

        Ok(store)
    }

    /// Create an in-memory store (no snapshot), for tests and ephemeral use.
    pub fn in_memory() -> Self {
        Self::build(None)
    }

    fn build(snapshot_path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                write_lock: Mutex::new(()),
                snapshot_path,
                changes,
            }),
        }
    }

    /// Subscribe to the change feed.
    pub fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    /// Read a value, deserialized as `T`. Missing key returns `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.inner.entries.get(key) {
            Some(entry) => {
                let value = serde_json::from_value(entry.value().clone()).map_err(|e| {
                    AppError::Persistence(format!("failed to decode {}: {}", key, e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Write a value unconditionally.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::Persistence(format!("failed to encode {}: {}", key, e)))?;

        let _guard = self
            .inner
            .write_lock
            .lock()
            .map_err(|_| AppError::Persistence("store writer lock poisoned".to_string()))?;

        self.persist_with(key, Some(&value))?;
        self.inner.entries.insert(key.to_string(), value);
        self.emit(key);
        Ok(())
    }

    /// Atomically read-modify-write a single key.
    ///
    /// The closure sees the current value (None for a missing key) and
    /// returns the new one. Mutations are serialized by the writer lock,
    /// so concurrent credits of the same user cannot drop an award.
    pub fn update<T, F>(&self, key: &str, f: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce(Option<T>) -> Result<T, AppError>,
    {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .map_err(|_| AppError::Persistence("store writer lock poisoned".to_string()))?;

        let current = match self.inner.entries.get(key) {
            Some(entry) => Some(serde_json::from_value(entry.value().clone()).map_err(|e| {
                AppError::Persistence(format!("failed to decode {}: {}", key, e))
            })?),
            None => None,
        };

        let updated = f(current)?;
        let encoded = serde_json::to_value(&updated)
            .map_err(|e| AppError::Persistence(format!("failed to encode {}: {}", key, e)))?;

        // Snapshot first: a persistence failure must leave the in-memory
        // state untouched (no partial credit).
        self.persist_with(key, Some(&encoded))?;
        self.inner.entries.insert(key.to_string(), encoded);
        self.emit(key);
        Ok(updated)
    }

    /// Remove a key. Removing a missing key is a no-op.
    pub fn remove(&self, key: &str) -> Result<(), AppError> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .map_err(|_| AppError::Persistence("store writer lock poisoned".to_string()))?;

        if !self.inner.entries.contains_key(key) {
            return Ok(());
        }

        self.persist_with(key, None)?;
        self.inner.entries.remove(key);
        self.emit(key);
        Ok(())
    }

    /// List all keys under a prefix.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove legacy calendar-day collection markers.
    ///
    /// The daily marker was superseded by the 20-hour activation window;
    /// nothing reads these keys anymore, so they are swept at startup.
    /// Returns the number of keys removed.
    pub fn purge_legacy_daily_markers(&self) -> Result<usize, AppError> {
        let legacy = self.keys_with_prefix(keys::DAILY_COLLECTIONS);
        for key in &legacy {
            self.remove(key)?;
        }
        if !legacy.is_empty() {
            tracing::info!(count = legacy.len(), "Purged legacy daily collection markers");
        }
        Ok(legacy.len())
    }

    /// Write the snapshot with `key` overridden (or removed, for None).
    ///
    /// Called with the writer lock held and no entry guards, so iterating
    /// the map is safe.
    fn persist_with(&self, key: &str, value: Option<&Value>) -> Result<(), AppError> {
        let Some(path) = &self.inner.snapshot_path else {
            return Ok(());
        };

        let mut map: BTreeMap<String, Value> = self
            .inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        match value {
            Some(v) => {
                map.insert(key.to_string(), v.clone());
            }
            None => {
                map.remove(key);
            }
        }

        let bytes = serde_json::to_vec(&map)
            .map_err(|e| AppError::Persistence(format!("failed to encode snapshot: {}", e)))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .map_err(|e| AppError::Persistence(format!("failed to write snapshot: {}", e)))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| AppError::Persistence(format!("failed to commit snapshot: {}", e)))?;
        Ok(())
    }

    fn emit(&self, key: &str) {
        // No receivers is fine; views may not be subscribed yet.
        let _ = self.inner.changes.send(StoreChange {
            key: key.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_snapshot(name: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("cleanbage-kv-{}-{}.json", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = KvStore::in_memory();
        let value: Option<u64> = store.get("user/nobody").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_put_then_get() {
        let store = KvStore::in_memory();
        store.put("user/U1", &42u64).unwrap();
        assert_eq!(store.get::<u64>("user/U1").unwrap(), Some(42));
    }

    #[test]
    fn test_update_sees_current_and_commits() {
        let store = KvStore::in_memory();
        let first = store
            .update("counter", |cur: Option<u64>| Ok(cur.unwrap_or(0) + 3))
            .unwrap();
        assert_eq!(first, 3);
        let second = store
            .update("counter", |cur: Option<u64>| Ok(cur.unwrap_or(0) + 3))
            .unwrap();
        assert_eq!(second, 6);
    }

    #[test]
    fn test_update_failure_leaves_state_untouched() {
        let store = KvStore::in_memory();
        store.put("counter", &5u64).unwrap();
        let result = store.update("counter", |_: Option<u64>| {
            Err::<u64, _>(AppError::InvalidAmount)
        });
        assert!(result.is_err());
        assert_eq!(store.get::<u64>("counter").unwrap(), Some(5));
    }

    #[test]
    fn test_keys_with_prefix() {
        let store = KvStore::in_memory();
        store.put("user/U1", &1u64).unwrap();
        store.put("user/U2", &2u64).unwrap();
        store.put("qrActivation/U1", &3u64).unwrap();

        let mut keys = store.keys_with_prefix("user/");
        keys.sort();
        assert_eq!(keys, vec!["user/U1", "user/U2"]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let path = temp_snapshot("roundtrip");
        {
            let store = KvStore::open(&path).unwrap();
            store.put("user/U1", &250u64).unwrap();
        }
        let reopened = KvStore::open(&path).unwrap();
        assert_eq!(reopened.get::<u64>("user/U1").unwrap(), Some(250));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_persist_failure_is_not_committed() {
        // Point the snapshot at a path whose parent does not exist.
        let store = KvStore {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                write_lock: Mutex::new(()),
                snapshot_path: Some(PathBuf::from("/nonexistent-dir/snap.json")),
                changes: broadcast::channel(4).0,
            }),
        };

        let result = store.update("counter", |cur: Option<u64>| Ok(cur.unwrap_or(0) + 3));
        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert_eq!(store.get::<u64>("counter").unwrap(), None);
    }

    #[test]
    fn test_purge_legacy_daily_markers() {
        let store = KvStore::in_memory();
        store
            .put("dailyCollections/2024-01-01", &vec!["U1".to_string()])
            .unwrap();
        store
            .put("dailyCollections/2024-01-02", &vec!["U2".to_string()])
            .unwrap();
        store.put("user/U1", &3u64).unwrap();

        let purged = store.purge_legacy_daily_markers().unwrap();
        assert_eq!(purged, 2);
        assert!(store.keys_with_prefix("dailyCollections/").is_empty());
        assert_eq!(store.get::<u64>("user/U1").unwrap(), Some(3));
    }

    #[test]
    fn test_change_feed_emits_on_mutation() {
        let store = KvStore::in_memory();
        let mut rx = store.watch();
        store.put("user/U1", &1u64).unwrap();

        let change = rx.try_recv().unwrap();
        assert_eq!(change.key, "user/U1");
    }
}
