//! Identity table: assigns and retrieves the portal-visible numeric
//! identifier for each mapped entry, plus tenant metadata.
//!
//! Ids come from the store's monotonic sequence and never change once
//! assigned; moves and renames only update the associated path. The digest
//! mapping is persisted before the entry row, so a store failure can never
//! hand out an id that was not durably recorded.

use crate::digest::DigestMapper;
use crate::error::{MountError, Result};
use crate::types::{path_str, EntryKind, MappedEntry};
use fsmount_store::{NewEntry, RepoStore, ENTRY_ID_SEQUENCE};
use std::path::Path;
use tracing::info;

/// Durable id assignment for one repository instance.
#[derive(Clone)]
pub struct IdentityTable {
    store: RepoStore,
    mapper: DigestMapper,
    repository_id: i64,
    company_id: i64,
    group_id: i64,
}

impl IdentityTable {
    pub fn new(
        store: RepoStore,
        mapper: DigestMapper,
        repository_id: i64,
        company_id: i64,
        group_id: i64,
    ) -> Self {
        Self {
            store,
            mapper,
            repository_id,
            company_id,
            group_id,
        }
    }

    /// Return the existing entry for a path, or allocate one.
    ///
    /// Callers racing on the same never-seen path must serialize through the
    /// resolver's per-repository mutex; this method itself performs the plain
    /// find-or-allocate sequence.
    pub async fn get_or_create(&self, path: &Path, kind: EntryKind) -> Result<MappedEntry> {
        let path_text = path_str(path);

        if let Some(record) = self
            .store
            .entry_by_path(self.repository_id, &path_text)
            .await?
        {
            return MappedEntry::from_record(record);
        }

        // Digest association first: if this write fails the operation as a
        // whole fails, and no id is issued.
        let key = self.mapper.map_and_persist(path).await?;
        let id = self.store.next_id(ENTRY_ID_SEQUENCE).await?;

        let record = self
            .store
            .entry_insert(&NewEntry {
                id,
                repository_id: self.repository_id,
                company_id: self.company_id,
                group_id: self.group_id,
                digest_key: key,
                path: path_text,
                kind: kind.as_str().to_string(),
            })
            .await?;

        info!(id, path = %path.display(), %kind, "Assigned numeric id");
        MappedEntry::from_record(record)
    }

    /// Fetch an entry by numeric id.
    pub async fn by_id(&self, id: i64) -> Result<Option<MappedEntry>> {
        match self.store.entry_by_id(id).await? {
            Some(record) => Ok(Some(MappedEntry::from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Fetch an entry by its current path.
    pub async fn by_path(&self, path: &Path) -> Result<Option<MappedEntry>> {
        match self
            .store
            .entry_by_path(self.repository_id, &path_str(path))
            .await?
        {
            Some(record) => Ok(Some(MappedEntry::from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Point an entry at a new path after a move/rename. The entry row and
    /// the digest mapping change in one store transaction.
    pub async fn update_path(&self, id: i64, new_path: &Path) -> Result<MappedEntry> {
        let new_key = DigestMapper::compute_key(new_path);
        let record = self
            .store
            .entry_update_path(id, &path_str(new_path), &new_key)
            .await
            .map_err(|e| match e {
                fsmount_store::StoreError::NotFound(msg) => MountError::NotFound(msg),
                other => MountError::Store(other),
            })?;
        MappedEntry::from_record(record)
    }

    /// Remove an entry and its digest association.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.store.entry_delete(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table() -> IdentityTable {
        let store = RepoStore::open_in_memory().await.unwrap();
        let mapper = DigestMapper::new(store.clone(), 7);
        IdentityTable::new(store, mapper, 7, 1, 2)
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing_id() {
        let table = table().await;
        let p = Path::new("/data/docs");

        let first = table.get_or_create(p, EntryKind::Folder).await.unwrap();
        let second = table.get_or_create(p, EntryKind::Folder).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.key, DigestMapper::compute_key(p));
        assert_eq!(first.company_id, 1);
        assert_eq!(first.group_id, 2);
    }

    #[tokio::test]
    async fn ids_are_distinct_per_path() {
        let table = table().await;
        let a = table
            .get_or_create(Path::new("/data/a"), EntryKind::File)
            .await
            .unwrap();
        let b = table
            .get_or_create(Path::new("/data/b"), EntryKind::File)
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn update_path_keeps_id_and_rewrites_key() {
        let table = table().await;
        let entry = table
            .get_or_create(Path::new("/data/docs"), EntryKind::Folder)
            .await
            .unwrap();

        let moved = table
            .update_path(entry.id, Path::new("/data/documents"))
            .await
            .unwrap();
        assert_eq!(moved.id, entry.id);
        assert_eq!(moved.path, Path::new("/data/documents"));
        assert_eq!(
            moved.key,
            DigestMapper::compute_key(Path::new("/data/documents"))
        );
        assert_ne!(moved.key, entry.key);
    }

    #[tokio::test]
    async fn update_path_for_unissued_id_is_not_found() {
        let table = table().await;
        let err = table
            .update_path(9999, Path::new("/data/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let table = table().await;
        let entry = table
            .get_or_create(Path::new("/data/tmp.txt"), EntryKind::File)
            .await
            .unwrap();
        assert!(table.delete(entry.id).await.unwrap());
        assert!(table.by_id(entry.id).await.unwrap().is_none());
    }
}
