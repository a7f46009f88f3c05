//! Expiring cross-process locks.
//!
//! Backs reindex mutual exclusion across every process sharing the database
//! file. Acquisition never blocks: contended callers get `false` immediately.
//! Each lock carries an expiration so a crashed holder cannot block recovery
//! forever; expired rows are reaped on the next acquisition attempt.

use crate::{now_ms, RepoStore, Result};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, warn};

/// Default lock lifetime: one hour, matching the expected upper bound of a
/// full-tree reindex.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60 * 60);

impl RepoStore {
    /// Try to acquire an expiring lock. Returns false if another live holder
    /// owns the scope.
    pub async fn lock_try_acquire(
        &self,
        scope_key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let now = now_ms();
        let expires_at = now + ttl.as_millis() as i64;

        let mut tx = self.pool.begin().await?;

        let reaped = sqlx::query(
            "DELETE FROM fsmount_locks WHERE scope_key = ?1 AND expires_at <= ?2",
        )
        .bind(scope_key)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if reaped.rows_affected() > 0 {
            warn!(scope_key, "Reaped expired lock from a previous holder");
        }

        let result = sqlx::query(
            "INSERT INTO fsmount_locks (scope_key, holder, acquired_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(scope_key) DO NOTHING",
        )
        .bind(scope_key)
        .bind(holder)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let acquired = result.rows_affected() == 1;
        debug!(scope_key, holder, acquired, "Lock acquisition attempt");
        Ok(acquired)
    }

    /// Release a lock held by the given holder. A release by anyone else is
    /// ignored, so a slow holder cannot free a lock re-acquired after expiry.
    pub async fn lock_release(&self, scope_key: &str, holder: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM fsmount_locks WHERE scope_key = ?1 AND holder = ?2",
        )
        .bind(scope_key)
        .bind(holder)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected() > 0;
        debug!(scope_key, holder, released, "Lock released");
        Ok(released)
    }

    /// Whether a live (non-expired) holder owns the scope.
    pub async fn lock_is_held(&self, scope_key: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM fsmount_locks WHERE scope_key = ?1 AND expires_at > ?2",
        )
        .bind(scope_key)
        .bind(now_ms())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>(0) > 0)
    }
}
