//! Named monotonic counters.
//!
//! Backs numeric-id allocation. Values only ever increase; the increment and
//! read happen in one statement so concurrent callers never observe the same
//! value twice.

use crate::{RepoStore, Result};
use sqlx::Row;

/// Counter name used for identity entry ids.
pub const ENTRY_ID_SEQUENCE: &str = "fsmount_entry";

impl RepoStore {
    /// Return the next value of a named counter, starting at 1.
    pub async fn next_id(&self, name: &str) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO fsmount_counters (name, value) VALUES (?1, 1) \
             ON CONFLICT(name) DO UPDATE SET value = value + 1 \
             RETURNING value",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>(0))
    }

    /// Current value of a named counter without incrementing it.
    pub async fn current_id(&self, name: &str) -> Result<i64> {
        let row = sqlx::query("SELECT value FROM fsmount_counters WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>(0)).unwrap_or(0))
    }
}
