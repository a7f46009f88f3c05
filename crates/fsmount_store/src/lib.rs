//! Durable store layer for the fsmount repository core.
//!
//! This crate provides a single source of truth for everything the mapping
//! core persists:
//! - Digest mappings: content-independent key -> absolute path associations
//! - Identity entries: the numeric-id rows exposed to the host portal
//! - Sequence counters: monotonic numeric-id allocation
//! - Expiring locks: cross-process mutual exclusion for reindex runs
//!
//! All tables are scoped by repository id so one database can serve several
//! mounted trees without sharing state across tenants.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fsmount_store::{RepoStore, Result};
//!
//! let store = RepoStore::open("~/.fsmount/fsmount.sqlite3").await?;
//! let id = store.next_id("fsmount_entry").await?;
//! ```

mod entries;
mod error;
mod lock;
mod mappings;
mod sequence;
mod types;

pub use error::{Result, StoreError};
pub use lock::DEFAULT_LOCK_TTL;
pub use sequence::ENTRY_ID_SEQUENCE;
pub use types::{EntryRecord, MappingOutcome, NewEntry};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Database schema.
///
/// Note: all timestamps are stored as INTEGER (milliseconds since Unix epoch).
const SCHEMA_SQL: &str = r#"
-- Digest mappings: stable key -> current absolute path
CREATE TABLE IF NOT EXISTS fsmount_mappings (
    repository_id INTEGER NOT NULL,
    digest_key TEXT NOT NULL,
    path TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (repository_id, digest_key)
);

CREATE INDEX IF NOT EXISTS idx_fsmount_mappings_path
    ON fsmount_mappings(repository_id, path);

-- Identity entries: the numeric ids handed to the host portal
CREATE TABLE IF NOT EXISTS fsmount_entries (
    id INTEGER PRIMARY KEY,
    repository_id INTEGER NOT NULL,
    company_id INTEGER NOT NULL,
    group_id INTEGER NOT NULL,
    digest_key TEXT NOT NULL,
    path TEXT NOT NULL,
    kind TEXT NOT NULL
        CHECK (kind IN ('folder', 'file')),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(repository_id, path)
);

-- Named monotonic counters for numeric-id allocation
CREATE TABLE IF NOT EXISTS fsmount_counters (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

-- Expiring cross-process locks (reindex mutual exclusion)
CREATE TABLE IF NOT EXISTS fsmount_locks (
    scope_key TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
"#;

/// Unified store handle for all fsmount persistence.
///
/// Cloneable; clones share the same connection pool.
#[derive(Clone)]
pub struct RepoStore {
    pool: SqlitePool,
}

impl RepoStore {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(path = %path.display(), "Store opened");

        Ok(store)
    }

    /// Open an in-memory database. Used by tests.
    ///
    /// The pool is capped at one connection so every caller sees the same
    /// memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Access the underlying pool. Escape hatch for maintenance queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

/// Current wall-clock time as milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
