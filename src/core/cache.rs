//! SQLite-backed HTTP response cache
//!
//! API responses are cached in a user-local SQLite database so repeated
//! metadata and data pulls do not hammer the upstream services. Entries
//! are keyed by a SHA-256 of the request URL and expire after a TTL
//! (one day by default). The cache lives in the platform cache
//! directory and can always be deleted safely.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Database filename within the cache directory
const CACHE_FILE: &str = "http-cache.db";

/// Current schema version - cache is rebuilt on version mismatch
const SCHEMA_VERSION: i32 = 1;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cache directory available on this platform")]
    NoCacheDir,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cache statistics for `rivapi cache status`
#[derive(Debug, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub db_size_bytes: u64,
    pub oldest_entry: Option<chrono::DateTime<Utc>>,
}

/// The HTTP response cache backed by SQLite
pub struct HttpCache {
    conn: Connection,
    path: PathBuf,
}

impl HttpCache {
    /// Open or create the cache at its default platform location
    pub fn open() -> Result<Self, CacheError> {
        Self::open_at(&Self::default_path().ok_or(CacheError::NoCacheDir)?)
    }

    /// Open or create a cache at an explicit path
    pub fn open_at(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let needs_init = !path.exists();
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let cache = Self {
            conn,
            path: path.to_path_buf(),
        };

        if needs_init {
            cache.init_schema()?;
        } else if cache.needs_schema_rebuild()? {
            cache.reinitialize_schema()?;
        }

        Ok(cache)
    }

    /// Default cache database path for this platform
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rivapi")
            .map(|dirs| dirs.cache_dir().join(CACHE_FILE))
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);
            CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                body TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            );
            "#,
        )?;
        self.conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Check if schema version matches current version
    fn needs_schema_rebuild(&self) -> Result<bool, CacheError> {
        let current_version: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        Ok(current_version != SCHEMA_VERSION)
    }

    /// Drop all tables and reinitialize (no migrations needed)
    fn reinitialize_schema(&self) -> Result<(), CacheError> {
        self.conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS schema_version;
            DROP TABLE IF EXISTS responses;
            "#,
        )?;
        self.init_schema()
    }

    /// Return the cached body for a URL if it is younger than `ttl`
    pub fn lookup(&self, url: &str, ttl: Duration) -> Result<Option<String>, CacheError> {
        let cutoff = Utc::now().timestamp() - ttl.as_secs() as i64;
        let body = self
            .conn
            .query_row(
                "SELECT body FROM responses WHERE key = ?1 AND fetched_at >= ?2",
                params![url_key(url), cutoff],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// Store (or replace) the response body for a URL
    pub fn store(&self, url: &str, body: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO responses (key, url, body, fetched_at) VALUES (?1, ?2, ?3, ?4)",
            params![url_key(url), url, body, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Get cache statistics
    pub fn statistics(&self) -> Result<CacheStats, CacheError> {
        let total_entries: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;

        let oldest: Option<i64> = self
            .conn
            .query_row("SELECT MIN(fetched_at) FROM responses", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(CacheStats {
            total_entries,
            db_size_bytes,
            oldest_entry: oldest.and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
        })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Delete the cache database and its WAL sidecars at the default location.
///
/// Returns true if a database file existed.
pub fn remove_default_cache() -> Result<bool, CacheError> {
    let path = HttpCache::default_path().ok_or(CacheError::NoCacheDir)?;
    remove_cache_at(&path)
}

/// Delete a cache database and its WAL sidecars
pub fn remove_cache_at(path: &Path) -> Result<bool, CacheError> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(path)?;
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(sidecar));
    }
    Ok(true)
}

/// Cache key: SHA-256 hex digest of the URL
fn url_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}
