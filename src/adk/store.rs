// SPDX-License-Identifier: MIT

//! Execution state store
//!
//! Keyed, expiring persistence for execution records. Writes are
//! last-write-wins upserts; each execution id is owned by exactly one
//! engine loop, so no optimistic concurrency control is needed.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::adk::error::Result;

/// Record expiry used when nothing else is configured (24h)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry used when `now + ttl` doesn't fit in an `Instant` (~30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Backend for keyed, expiring JSON records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Upsert `value` under `key`, replacing any previous value and resetting its expiry
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Latest value under `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<Value>>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process store with lazy expiry
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired record, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Purged {} expired records", removed);
        }
        removed
    }

    /// Number of live (unexpired) records
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: expiry(Instant::now(), ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }
}

/// Typed view over a [`StateStore`] namespace, e.g. `workflow:execution:{id}`
pub struct RecordStore<T> {
    store: Arc<dyn StateStore>,
    namespace: String,
    ttl: Duration,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            ttl: self.ttl,
            _record: PhantomData,
        }
    }
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn StateStore>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl,
            _record: PhantomData,
        }
    }

    /// Same namespace and backend with a different expiry
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Full key for a record id
    pub fn key(&self, id: &str) -> String {
        format!("{}:{}", self.namespace, id)
    }

    pub async fn save(&self, id: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.store.put(&self.key(id), value, self.ttl).await
    }

    pub async fn load(&self, id: &str) -> Result<Option<T>> {
        match self.store.get(&self.key(id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Record {
        id: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStateStore::new();
        store
            .put("k", json!({"a": 1}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_is_last_write_wins() {
        let store = MemoryStateStore::new();
        let ttl = Duration::from_secs(60);
        store.put("k", json!(1), ttl).await.unwrap();
        store.put("k", json!(2), ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_records_are_invisible_and_purged() {
        let store = MemoryStateStore::new();
        store
            .put("short", json!("x"), Duration::from_millis(10))
            .await
            .unwrap();
        store
            .put("long", json!("y"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_saturates() {
        let store = MemoryStateStore::new();
        store
            .put("k", json!(1), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));
        assert_eq!(store.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_record_store_namespaces_keys() {
        let backend = Arc::new(MemoryStateStore::new());
        let records: RecordStore<Record> =
            RecordStore::new(backend.clone(), "workflow:execution", DEFAULT_TTL);

        let record = Record {
            id: "abc".to_string(),
            count: 3,
        };
        records.save("abc", &record).await.unwrap();

        assert_eq!(records.key("abc"), "workflow:execution:abc");
        assert!(backend.get("workflow:execution:abc").await.unwrap().is_some());
        assert_eq!(records.load("abc").await.unwrap(), Some(record));
        assert_eq!(records.load("nope").await.unwrap(), None);
    }
}
