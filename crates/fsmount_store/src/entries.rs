//! Identity entry operations.
//!
//! An entry row is the durable record behind one portal-visible numeric id.
//! Path updates and deletes touch the entry row and its digest mapping inside
//! a single transaction so the two tables never disagree.

use crate::types::{KIND_FILE, KIND_FOLDER};
use crate::{now_ms, EntryRecord, NewEntry, RepoStore, Result, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

fn record_from_row(row: &SqliteRow) -> EntryRecord {
    EntryRecord {
        id: row.get("id"),
        repository_id: row.get("repository_id"),
        company_id: row.get("company_id"),
        group_id: row.get("group_id"),
        digest_key: row.get("digest_key"),
        path: row.get("path"),
        kind: row.get("kind"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLUMNS: &str = "id, repository_id, company_id, group_id, digest_key, path, kind, \
                              created_at, updated_at";

/// Escape LIKE wildcards in a literal path prefix.
fn like_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl RepoStore {
    /// Insert a new identity entry row.
    pub async fn entry_insert(&self, entry: &NewEntry) -> Result<EntryRecord> {
        if entry.kind != KIND_FOLDER && entry.kind != KIND_FILE {
            return Err(StoreError::constraint(format!(
                "invalid entry kind: {}",
                entry.kind
            )));
        }

        let now = now_ms();
        sqlx::query(
            "INSERT INTO fsmount_entries \
             (id, repository_id, company_id, group_id, digest_key, path, kind, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(entry.id)
        .bind(entry.repository_id)
        .bind(entry.company_id)
        .bind(entry.group_id)
        .bind(&entry.digest_key)
        .bind(&entry.path)
        .bind(&entry.kind)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(id = entry.id, path = %entry.path, kind = %entry.kind, "Entry inserted");

        Ok(EntryRecord {
            id: entry.id,
            repository_id: entry.repository_id,
            company_id: entry.company_id,
            group_id: entry.group_id,
            digest_key: entry.digest_key.clone(),
            path: entry.path.clone(),
            kind: entry.kind.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch an entry by its numeric id.
    pub async fn entry_by_id(&self, id: i64) -> Result<Option<EntryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM fsmount_entries WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Fetch an entry by its current absolute path.
    pub async fn entry_by_path(
        &self,
        repository_id: i64,
        path: &str,
    ) -> Result<Option<EntryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM fsmount_entries \
             WHERE repository_id = ?1 AND path = ?2"
        ))
        .bind(repository_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Move an entry to a new path, replacing its digest mapping.
    ///
    /// The entry row update, the removal of the old mapping and the insert of
    /// the new one commit atomically. Fails with `NotFound` if the id was
    /// never issued.
    pub async fn entry_update_path(
        &self,
        id: i64,
        new_path: &str,
        new_key: &str,
    ) -> Result<EntryRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM fsmount_entries WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let old = match row.as_ref() {
            Some(r) => record_from_row(r),
            None => return Err(StoreError::not_found(format!("entry {id}"))),
        };

        let now = now_ms();
        sqlx::query(
            "UPDATE fsmount_entries SET path = ?1, digest_key = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(new_path)
        .bind(new_key)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM fsmount_mappings WHERE repository_id = ?1 AND digest_key = ?2")
            .bind(old.repository_id)
            .bind(&old.digest_key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO fsmount_mappings (repository_id, digest_key, path, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(repository_id, digest_key) DO UPDATE SET path = excluded.path",
        )
        .bind(old.repository_id)
        .bind(new_key)
        .bind(new_path)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(id, old_path = %old.path, new_path, "Entry path updated");

        Ok(EntryRecord {
            digest_key: new_key.to_string(),
            path: new_path.to_string(),
            updated_at: now,
            ..old
        })
    }

    /// Delete an entry and its digest mapping atomically.
    ///
    /// Returns true if the entry existed.
    pub async fn entry_delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT repository_id, digest_key FROM fsmount_entries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let (repository_id, digest_key): (i64, String) = match row {
            Some(r) => (r.get(0), r.get(1)),
            None => return Ok(false),
        };

        sqlx::query("DELETE FROM fsmount_entries WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM fsmount_mappings WHERE repository_id = ?1 AND digest_key = ?2")
            .bind(repository_id)
            .bind(&digest_key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(id, "Entry deleted");
        Ok(true)
    }

    /// Entries whose path lies strictly below a directory path. Used to
    /// rebase a subtree after a folder move or rename.
    pub async fn entry_list_prefix(
        &self,
        repository_id: i64,
        dir_path: &str,
    ) -> Result<Vec<EntryRecord>> {
        let pattern = format!("{}/%", like_escape(dir_path));
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM fsmount_entries \
             WHERE repository_id = ?1 AND path LIKE ?2 ESCAPE '\\' \
             ORDER BY path"
        ))
        .bind(repository_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Number of entries recorded for a repository.
    pub async fn entry_count(&self, repository_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM fsmount_entries WHERE repository_id = ?1")
            .bind(repository_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }
}
