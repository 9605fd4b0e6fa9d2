//! Network-store storage backend — a Redis-backed client.
//!
//! No teacher source file for a Redis cache provider was present in the
//! retrieval snapshot (`mcb-providers/src/cache/mod.rs` declares `pub mod
//! redis;` but the file itself was filtered out); this backend is
//! hand-written against the `redis` crate's own documented API, using the
//! `tokio-comp`/`connection-manager` features already pinned in the
//! workspace dependencies.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use refcache_domain::error::{Error, Result};
use refcache_domain::ports::StorageBackend;
use refcache_domain::value_objects::entry::Entry;

/// Redis-backed storage. Each entry is stored at `<prefix>:entry:<key>` as a
/// single JSON blob; the service's native TTL is set from `expires_at - now`
/// (floored at 1 second) exactly per §4.5.
#[derive(Debug)]
pub struct RedisStorage {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStorage {
    /// Connect to `url` and construct a backend namespaced under `prefix`.
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if the connection cannot be established.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|source| Error::storage_with_source("invalid redis url", source))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|source| Error::storage_with_source("failed to connect to redis", source))?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:entry:{key}", self.prefix)
    }

    /// `keys(namespace)` scans every key under this backend's prefix and
    /// filters by the namespace embedded in the decoded value — O(N) in
    /// stored entries, acceptable for typical cache sizes per §4.5.
    async fn scan_all_entries(&self) -> Result<Vec<(String, Entry)>> {
        let pattern = format!("{}:entry:*", self.prefix);
        let mut conn = self.conn.clone();
        let raw_keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|source| Error::storage_with_source("redis scan failed", source))?;

        let mut out = Vec::with_capacity(raw_keys.len());
        for raw_key in raw_keys {
            let blob: Option<String> = conn
                .get(&raw_key)
                .await
                .map_err(|source| Error::storage_with_source("redis get failed during scan", source))?;
            let Some(blob) = blob else { continue };
            let entry: Entry = serde_json::from_str(&blob)?;
            if !entry.is_live(Utc::now()) {
                continue;
            }
            let logical_key = raw_key
                .strip_prefix(&format!("{}:entry:", self.prefix))
                .unwrap_or(&raw_key)
                .to_owned();
            out.push((logical_key, entry));
        }
        Ok(out)
    }
}

#[async_trait]
impl StorageBackend for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let mut conn = self.conn.clone();
        let blob: Option<String> = conn
            .get(self.entry_key(key))
            .await
            .map_err(|source| Error::storage_with_source("redis get failed", source))?;
        let Some(blob) = blob else { return Ok(None) };
        let entry: Entry = serde_json::from_str(&blob)?;
        if entry.is_live(Utc::now()) {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<()> {
        let blob = serde_json::to_string(&entry)?;
        let mut conn = self.conn.clone();
        match entry.expires_at {
            Some(expires_at) => {
                let ttl_seconds = (expires_at - Utc::now()).num_seconds().max(1) as u64;
                let _: () = conn
                    .set_ex(self.entry_key(key), blob, ttl_seconds)
                    .await
                    .map_err(|source| Error::storage_with_source("redis set_ex failed", source))?;
            }
            None => {
                let _: () = conn
                    .set(self.entry_key(key), blob)
                    .await
                    .map_err(|source| Error::storage_with_source("redis set failed", source))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .del(self.entry_key(key))
            .await
            .map_err(|source| Error::storage_with_source("redis delete failed", source))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<u64> {
        let entries = self.scan_all_entries().await?;
        let mut conn = self.conn.clone();
        let mut removed = 0u64;
        for (key, entry) in entries {
            if namespace.is_none_or(|ns| entry.namespace == ns) {
                let deleted: u64 = conn
                    .del(self.entry_key(&key))
                    .await
                    .map_err(|source| Error::storage_with_source("redis clear failed", source))?;
                removed += deleted;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, namespace: Option<&str>) -> Result<Vec<String>> {
        let entries = self.scan_all_entries().await?;
        Ok(entries
            .into_iter()
            .filter(|(_, entry)| namespace.is_none_or(|ns| entry.namespace == ns))
            .map(|(key, _)| key)
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
