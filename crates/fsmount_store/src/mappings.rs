//! Digest mapping operations: stable key -> absolute path.
//!
//! Each association is written independently; a failed write never corrupts
//! rows persisted earlier. Inserts are first-writer-wins: an existing
//! association for a key is never overwritten by `mapping_put_if_absent`.

use crate::types::MappingOutcome;
use crate::{now_ms, RepoStore, Result};
use sqlx::Row;
use std::collections::HashSet;
use tracing::debug;

impl RepoStore {
    /// Look up the path currently associated with a digest key.
    pub async fn mapping_path(&self, repository_id: i64, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT path FROM fsmount_mappings WHERE repository_id = ?1 AND digest_key = ?2",
        )
        .bind(repository_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    /// Insert a key -> path association unless the key is already mapped.
    pub async fn mapping_put_if_absent(
        &self,
        repository_id: i64,
        key: &str,
        path: &str,
    ) -> Result<MappingOutcome> {
        let result = sqlx::query(
            "INSERT INTO fsmount_mappings (repository_id, digest_key, path, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(repository_id, digest_key) DO NOTHING",
        )
        .bind(repository_id)
        .bind(key)
        .bind(path)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(repository_id, key, path, "Mapping persisted");
            return Ok(MappingOutcome::Inserted);
        }

        let existing = self
            .mapping_path(repository_id, key)
            .await?
            .ok_or_else(|| crate::StoreError::invalid_state("mapping vanished during insert"))?;
        Ok(MappingOutcome::AlreadyMapped(existing))
    }

    /// Remove the association for a digest key. Returns true if a row existed.
    pub async fn mapping_remove(&self, repository_id: i64, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM fsmount_mappings WHERE repository_id = ?1 AND digest_key = ?2",
        )
        .bind(repository_id)
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the mapping set of a repository with a complete walk result,
    /// in one transaction.
    ///
    /// Unseen keys are inserted; existing keys keep their stored association
    /// (first-writer-wins). Keys absent from `pairs` are pruned, unless an
    /// identity entry still references them (its staleness is decided by the
    /// resolver, not here). Returns `(inserted, pruned)` row counts.
    pub async fn mapping_replace_all(
        &self,
        repository_id: i64,
        pairs: &[(String, String)],
    ) -> Result<(usize, usize)> {
        let now = now_ms();
        let visited: HashSet<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        let mut inserted = 0usize;
        let mut pruned = 0usize;

        let mut tx = self.pool.begin().await?;
        for (key, path) in pairs {
            let result = sqlx::query(
                "INSERT INTO fsmount_mappings (repository_id, digest_key, path, created_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(repository_id, digest_key) DO NOTHING",
            )
            .bind(repository_id)
            .bind(key)
            .bind(path)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        let stored = sqlx::query(
            "SELECT digest_key FROM fsmount_mappings WHERE repository_id = ?1",
        )
        .bind(repository_id)
        .fetch_all(&mut *tx)
        .await?;

        for row in stored {
            let key: String = row.get(0);
            if visited.contains(key.as_str()) {
                continue;
            }
            let result = sqlx::query(
                "DELETE FROM fsmount_mappings \
                 WHERE repository_id = ?1 AND digest_key = ?2 \
                   AND NOT EXISTS (SELECT 1 FROM fsmount_entries e \
                                   WHERE e.repository_id = ?1 AND e.digest_key = ?2)",
            )
            .bind(repository_id)
            .bind(&key)
            .execute(&mut *tx)
            .await?;
            pruned += result.rows_affected() as usize;
        }
        tx.commit().await?;

        debug!(
            repository_id,
            offered = pairs.len(),
            inserted,
            pruned,
            "Mapping set replaced"
        );
        Ok((inserted, pruned))
    }

    /// Number of mappings persisted for a repository.
    pub async fn mapping_count(&self, repository_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM fsmount_mappings WHERE repository_id = ?1")
            .bind(repository_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    /// All key -> path associations for a repository.
    pub async fn mapping_list_all(&self, repository_id: i64) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT digest_key, path FROM fsmount_mappings WHERE repository_id = ?1 \
             ORDER BY digest_key",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }
}
