//! Configuration loading.
//!
//! A typed `RefcacheConfig` loaded via `figment` (environment variables,
//! optionally layered under a TOML file), resolving the storage-backend
//! connection parameters exactly per spec §6.

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use refcache_domain::error::{Error, Result};

/// Which unit `SizeMeasurer` measures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMode {
    /// Exact or approximate token counts via a [`refcache_domain::ports::Tokenizer`].
    Token,
    /// Raw byte length of the canonical JSON serialization.
    Byte,
}

impl Default for SizeMode {
    fn default() -> Self {
        Self::Token
    }
}

/// Which storage backend the reference store is configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// `parking_lot::Mutex<HashMap<..>>`, no persistence.
    Memory,
    /// `sqlx::SqlitePool` in WAL mode.
    Sqlite,
    /// `redis`-backed network store.
    Redis,
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::Memory
    }
}

/// Top-level configuration for a `ReferenceStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefcacheConfig {
    /// The cache name embedded in every minted reference identifier.
    pub cache_name: String,
    /// Which storage backend to construct.
    pub storage: StorageKind,
    /// Explicit SQLite database file path. Falls back to
    /// `MCP_REFCACHE_DB_PATH`, then `$XDG_CACHE_HOME/mcp-refcache/cache.db`
    /// (or `$HOME/.cache/...`) when unset, resolved by [`resolve_db_path`].
    pub db_path: Option<PathBuf>,
    /// Explicit Redis connection URL. Falls back to `REDIS_URL`, then the
    /// discrete `REDIS_HOST`/`REDIS_PORT`/`REDIS_DB`/`REDIS_PASSWORD`/
    /// `REDIS_SSL` variables, resolved by [`resolve_redis_url`].
    pub redis_url: Option<String>,
    /// Which size unit to measure in.
    pub size_mode: SizeMode,
    /// Cache-wide default `max_size`, used when no per-tool or per-call
    /// override is given (§4.7's lowest-precedence level).
    pub default_max_size: u64,
    /// How long terminal task records are retained before cleanup, in seconds.
    pub task_retention_seconds: i64,
    /// How often the cleanup loop runs, in seconds.
    pub cleanup_interval_seconds: u64,
    /// Number of concurrent workers in the in-process task pool.
    pub worker_pool_size: usize,
}

impl Default for RefcacheConfig {
    fn default() -> Self {
        Self {
            cache_name: "refcache".to_owned(),
            storage: StorageKind::default(),
            db_path: None,
            redis_url: None,
            size_mode: SizeMode::default(),
            default_max_size: 2048,
            task_retention_seconds: 300,
            cleanup_interval_seconds: 60,
            worker_pool_size: 4,
        }
    }
}

impl RefcacheConfig {
    /// Load configuration from environment variables (prefix `REFCACHE_`),
    /// optionally layered under a TOML file at `path`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the file exists but fails to
    /// parse, or if environment values fail to deserialize into the typed
    /// shape.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("REFCACHE_"));
        figment
            .extract()
            .map_err(|source| Error::configuration_with_source("failed to load configuration", source))
    }

    /// Resolve the SQLite database file path per §6's precedence order:
    /// explicit config → `MCP_REFCACHE_DB_PATH` → XDG cache dir.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if no explicit path, environment
    /// variable, or home/cache directory can be determined.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        if let Ok(path) = std::env::var("MCP_REFCACHE_DB_PATH") {
            return Ok(PathBuf::from(path));
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| Error::configuration("could not determine a cache directory for the embedded database"))?;
        Ok(cache_dir.join("mcp-refcache").join("cache.db"))
    }

    /// Resolve the Redis connection URL per §6's precedence order: explicit
    /// config → `REDIS_URL` → discrete `REDIS_HOST`/`REDIS_PORT`/`REDIS_DB`/
    /// `REDIS_PASSWORD`/`REDIS_SSL` variables.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if none of the above resolve to a URL.
    pub fn resolve_redis_url(&self) -> Result<String> {
        if let Some(url) = &self.redis_url {
            return Ok(url.clone());
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            return Ok(url);
        }
        let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_owned());
        let db = std::env::var("REDIS_DB").unwrap_or_else(|_| "0".to_owned());
        let scheme = if std::env::var("REDIS_SSL").is_ok_and(|v| v == "true" || v == "1") {
            "rediss"
        } else {
            "redis"
        };
        let auth = std::env::var("REDIS_PASSWORD")
            .map(|password| format!(":{password}@"))
            .unwrap_or_default();
        Ok(format!("{scheme}://{auth}{host}:{port}/{db}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_open_question_four() {
        let config = RefcacheConfig::default();
        assert_eq!(config.task_retention_seconds, 300);
        assert_eq!(config.cleanup_interval_seconds, 60);
    }

    #[test]
    fn redis_url_falls_back_to_discrete_vars() {
        let config = RefcacheConfig::default();
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("REDIS_PASSWORD");
        std::env::remove_var("REDIS_SSL");
        let url = config.resolve_redis_url().unwrap();
        assert_eq!(url, "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn explicit_db_path_wins_over_environment() {
        let config = RefcacheConfig {
            db_path: Some(PathBuf::from("/tmp/explicit.db")),
            ..RefcacheConfig::default()
        };
        assert_eq!(config.resolve_db_path().unwrap(), PathBuf::from("/tmp/explicit.db"));
    }
}
