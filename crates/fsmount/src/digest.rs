//! Digest mapper: deterministic translation of absolute paths into stable,
//! content-independent keys, plus persistence of the key -> path association.
//!
//! The key is the SHA-256 of the UTF-8 bytes of the absolute path, encoded
//! as lowercase hex. It is a pure function of the path: hashing the same
//! path twice always yields the same key. Two distinct paths colliding on
//! one key is accepted as residual risk given the hash strength; collisions
//! are detected, logged and resolved first-writer-wins instead of silently
//! overwriting.

use crate::error::{MountError, Result};
use crate::indexer::reindex_scope;
use crate::types::path_str;
use fsmount_store::{MappingOutcome, RepoStore};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Computes and persists digest keys for one repository instance.
#[derive(Clone)]
pub struct DigestMapper {
    store: RepoStore,
    repository_id: i64,
}

impl DigestMapper {
    pub fn new(store: RepoStore, repository_id: i64) -> Self {
        Self {
            store,
            repository_id,
        }
    }

    /// Compute the digest key for a path. Pure; no store access.
    pub fn compute_key(path: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path_str(path).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Compute the key and persist the key -> path association unless the
    /// key is already bound.
    pub async fn map_and_persist(&self, path: &Path) -> Result<String> {
        let key = Self::compute_key(path);
        let path_text = path_str(path);

        match self
            .store
            .mapping_put_if_absent(self.repository_id, &key, &path_text)
            .await?
        {
            MappingOutcome::Inserted => {}
            MappingOutcome::AlreadyMapped(existing) if existing == path_text => {}
            MappingOutcome::AlreadyMapped(existing) => {
                // Distinct paths, one key. Keep the stored association.
                warn!(
                    key,
                    stored = %existing,
                    offered = %path_text,
                    "Digest key collision; keeping existing association"
                );
            }
        }

        Ok(key)
    }

    /// Resolve a digest key to its persisted path.
    ///
    /// A key that was never persisted is `NotFound` — unless a reindex is
    /// currently running for this repository, in which case the miss is
    /// reported as the retryable `IndexingInProgress`.
    pub async fn resolve(&self, key: &str) -> Result<PathBuf> {
        if let Some(path) = self.store.mapping_path(self.repository_id, key).await? {
            return Ok(PathBuf::from(path));
        }

        if self
            .store
            .lock_is_held(&reindex_scope(self.repository_id))
            .await?
        {
            debug!(key, "Digest key miss during reindex");
            return Err(MountError::IndexingInProgress);
        }

        error!(
            key,
            repository_id = self.repository_id,
            "Cannot find digest key; the index is inconsistent. Force a reindex to repair it."
        );
        Err(MountError::not_found(format!("digest key {key}")))
    }

    /// Drop the persisted association for a path. Used on delete.
    pub async fn forget(&self, path: &Path) -> Result<bool> {
        let key = Self::compute_key(path);
        let removed = self.store.mapping_remove(self.repository_id, &key).await?;
        debug!(path = %path.display(), removed, "Mapping forgotten");
        Ok(removed)
    }

    /// Commit a complete walk result in one store transaction: newly seen
    /// paths are persisted, associations whose path was not visited are
    /// pruned (entry-backed keys excepted; their staleness is the resolver's
    /// call). Returns `(inserted, pruned)`.
    pub async fn bulk_persist(&self, paths: &[PathBuf]) -> Result<(usize, usize)> {
        let pairs: Vec<(String, String)> = paths
            .iter()
            .map(|p| (Self::compute_key(p), path_str(p)))
            .collect();
        Ok(self
            .store
            .mapping_replace_all(self.repository_id, &pairs)
            .await?)
    }
}
