//! Embedded-DB storage backend — a local SQLite file in WAL mode.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use refcache_domain::error::{Error, Result};
use refcache_domain::ports::StorageBackend;
use refcache_domain::value_objects::access_policy::AccessPolicy;
use refcache_domain::value_objects::entry::Entry;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    key TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    namespace TEXT NOT NULL,
    policy_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    metadata_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_namespace ON entries(namespace);
CREATE INDEX IF NOT EXISTS idx_entries_expires_at ON entries(expires_at);
";

/// SQLite-backed storage, one table `entries` exactly per §4.5, WAL mode for
/// one-writer/many-readers concurrency.
#[derive(Debug)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if absent) the database file at `path`, apply the
    /// schema, and return a ready-to-use backend.
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if the connection or schema migration fails.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| Error::storage_with_source("failed to create database directory", source))?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|source| Error::storage_with_source("invalid sqlite path", source))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|source| Error::storage_with_source("failed to open sqlite pool", source))?;
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|source| Error::storage_with_source("failed to apply sqlite schema", source))?;
        Ok(Self { pool })
    }

    fn row_to_entry(
        value_json: String,
        namespace: String,
        policy_json: String,
        created_at: String,
        expires_at: Option<String>,
        metadata_json: String,
    ) -> Result<Entry> {
        let value = serde_json::from_str(&value_json)?;
        let policy: AccessPolicy = serde_json::from_str(&policy_json)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|source| Error::storage_with_source("corrupt created_at timestamp", source))?
            .with_timezone(&Utc);
        let expires_at = expires_at
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|source| Error::storage_with_source("corrupt expires_at timestamp", source))
            })
            .transpose()?;
        let metadata = serde_json::from_str(&metadata_json)?;
        Ok(Entry {
            value,
            namespace,
            policy,
            created_at,
            expires_at,
            metadata,
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            "SELECT value_json, namespace, policy_json, created_at, expires_at, metadata_json \
             FROM entries WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| Error::storage_with_source("sqlite get failed", source))?;

        let Some(row) = row else { return Ok(None) };
        let entry = Self::row_to_entry(
            row.try_get("value_json").map_err(|source| Error::storage_with_source("malformed row", source))?,
            row.try_get("namespace").map_err(|source| Error::storage_with_source("malformed row", source))?,
            row.try_get("policy_json").map_err(|source| Error::storage_with_source("malformed row", source))?,
            row.try_get("created_at").map_err(|source| Error::storage_with_source("malformed row", source))?,
            row.try_get("expires_at").map_err(|source| Error::storage_with_source("malformed row", source))?,
            row.try_get("metadata_json").map_err(|source| Error::storage_with_source("malformed row", source))?,
        )?;
        Ok(Some(entry))
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<()> {
        let value_json = serde_json::to_string(&entry.value)?;
        let policy_json = serde_json::to_string(&entry.policy)?;
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        sqlx::query(
            "INSERT INTO entries (key, value_json, namespace, policy_json, created_at, expires_at, metadata_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET \
                value_json = excluded.value_json, \
                namespace = excluded.namespace, \
                policy_json = excluded.policy_json, \
                created_at = excluded.created_at, \
                expires_at = excluded.expires_at, \
                metadata_json = excluded.metadata_json",
        )
        .bind(key)
        .bind(value_json)
        .bind(&entry.namespace)
        .bind(policy_json)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.expires_at.map(|dt| dt.to_rfc3339()))
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|source| Error::storage_with_source("sqlite set failed", source))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|source| Error::storage_with_source("sqlite delete failed", source))?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<u64> {
        let result = match namespace {
            Some(namespace) => sqlx::query("DELETE FROM entries WHERE namespace = ?")
                .bind(namespace)
                .execute(&self.pool)
                .await,
            None => sqlx::query("DELETE FROM entries").execute(&self.pool).await,
        }
        .map_err(|source| Error::storage_with_source("sqlite clear failed", source))?;
        Ok(result.rows_affected())
    }

    async fn keys(&self, namespace: Option<&str>) -> Result<Vec<String>> {
        let rows = match namespace {
            Some(namespace) => {
                sqlx::query("SELECT key FROM entries WHERE namespace = ?")
                    .bind(namespace)
                    .fetch_all(&self.pool)
                    .await
            }
            None => sqlx::query("SELECT key FROM entries").fetch_all(&self.pool).await,
        }
        .map_err(|source| Error::storage_with_source("sqlite keys failed", source))?;
        rows.into_iter()
            .map(|row| row.try_get("key").map_err(|source| Error::storage_with_source("malformed row", source)))
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
