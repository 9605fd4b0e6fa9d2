//! In-memory storage backend — a single mapping guarded by a reentrant lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use refcache_domain::error::Result;
use refcache_domain::ports::StorageBackend;
use refcache_domain::value_objects::entry::Entry;

/// A thread-safe in-memory storage backend, used for tests and
/// single-process servers. TTL is checked lazily on read; there is no
/// background sweep.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStorage {
    /// Construct an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if entry.is_live(Utc::now()) {
            Ok(Some(entry.clone()))
        } else {
            entries.remove(key);
            Ok(None)
        }
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<()> {
        self.entries.lock().insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        match namespace {
            Some(namespace) => entries.retain(|_, entry| entry.namespace != namespace),
            None => entries.clear(),
        }
        Ok((before - entries.len()) as u64)
    }

    async fn keys(&self, namespace: Option<&str>) -> Result<Vec<String>> {
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|(_, entry)| namespace.is_none_or(|ns| entry.namespace == ns))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
