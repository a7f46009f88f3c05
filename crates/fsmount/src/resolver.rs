//! Entry resolver: the single façade the adapter layer uses to go between
//! portal-assigned numeric identifiers and filesystem objects.
//!
//! The root directory is special-cased: it resolves to the configured
//! mount-point folder id, never to an ordinary mapped entry. All other
//! lookups go through the identity table, which is the source of truth for
//! issued ids — no path reconstruction is ever attempted for an id that was
//! never issued.
//!
//! Mutating operations perform the filesystem change and the mapping update
//! before returning, so a lookup that causally follows a rename always
//! observes the rename's effect.

use crate::config::MountConfig;
use crate::digest::DigestMapper;
use crate::error::{MountError, Result};
use crate::identity::IdentityTable;
use crate::indexer::{Reindexer, ReindexMode};
use crate::listing::{list_dir, ListingCache};
use crate::types::{path_str, Action, AllowAll, CallContext, EntryKind, MappedEntry, PermissionGate};
use fsmount_store::RepoStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Façade over the digest mapper, identity table and reindexer for one
/// mounted repository instance.
pub struct EntryResolver {
    config: MountConfig,
    store: RepoStore,
    digest: DigestMapper,
    identity: IdentityTable,
    indexer: Reindexer,
    gate: Arc<dyn PermissionGate>,
    /// Serializes find-or-create so two requests racing on the same
    /// never-seen path cannot both allocate a numeric id. Coarse by design:
    /// filesystem operations are I/O-bound, not high-frequency.
    create_lock: Mutex<()>,
}

impl EntryResolver {
    /// Build a resolver with no permission gate (everything allowed).
    pub async fn new(config: MountConfig, store: RepoStore) -> Result<Self> {
        Self::with_gate(config, store, Arc::new(AllowAll)).await
    }

    /// Build a resolver backed by the host portal's permission check.
    ///
    /// Validates the root folder and, when configured, kicks off one
    /// asynchronous reindex.
    pub async fn with_gate(
        config: MountConfig,
        store: RepoStore,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<Self> {
        config.validate()?;

        let digest = DigestMapper::new(store.clone(), config.repository_id);
        let identity = IdentityTable::new(
            store.clone(),
            digest.clone(),
            config.repository_id,
            config.company_id,
            config.group_id,
        );
        let indexer = Reindexer::new(
            store.clone(),
            digest.clone(),
            config.root_path.clone(),
            config.repository_id,
        );

        let resolver = Self {
            config,
            store,
            digest,
            identity,
            indexer,
            gate,
            create_lock: Mutex::new(()),
        };

        if resolver.config.reindex_on_startup {
            info!(root = %resolver.config.root_path.display(), "Reindex on startup requested");
            resolver.indexer.reindex(ReindexMode::Async).await;
        }

        Ok(resolver)
    }

    /// The configured root directory.
    pub fn root(&self) -> &Path {
        &self.config.root_path
    }

    /// The background reindexer for this repository.
    pub fn indexer(&self) -> &Reindexer {
        &self.indexer
    }

    /// Trigger a full-tree reindex. See [`Reindexer::reindex`].
    pub async fn reindex(&self, mode: ReindexMode) -> bool {
        self.indexer.reindex(mode).await
    }

    // ========================================================================
    // Identifier <-> path translation
    // ========================================================================

    /// Resolve a numeric identifier to its current filesystem path.
    ///
    /// The mount-point id returns the root path directly. A record whose
    /// backing file has disappeared is deleted and reported as `StaleEntry`;
    /// the next call for the same id yields `NotFound`.
    pub async fn id_to_path(&self, ctx: CallContext, id: i64) -> Result<PathBuf> {
        if id == self.config.mount_folder_id {
            return Ok(self.config.root_path.clone());
        }

        let entry = self
            .identity
            .by_id(id)
            .await?
            .ok_or_else(|| MountError::not_found(format!("entry {id}")))?;

        // A denied read must be indistinguishable from a missing object.
        if !ctx.is_internal()
            && !self.gate.check(entry.group_id, entry.kind, id, Action::View)
        {
            return Err(MountError::not_found(format!("entry {id}")));
        }

        // Only a definite miss is staleness; a transient I/O or permission
        // failure must not destroy a valid record.
        match std::fs::symlink_metadata(&entry.path) {
            Ok(_) => Ok(entry.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    id,
                    path = %entry.path.display(),
                    "Backing file no longer exists on disk; deleting stale entry"
                );
                self.identity.delete(id).await?;
                Err(MountError::StaleEntry {
                    id,
                    path: entry.path,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the full mapped entry for an id, with the same special cases as
    /// [`id_to_path`].
    pub async fn entry_by_id(&self, ctx: CallContext, id: i64) -> Result<MappedEntry> {
        let path = self.id_to_path(ctx, id).await?;
        if path == self.config.root_path {
            return Err(MountError::invalid_operation(
                "the mount point has no mapped entry; use the portal's mount folder",
            ));
        }
        self.identity
            .by_path(&path)
            .await?
            .ok_or_else(|| MountError::not_found(format!("entry {id}")))
    }

    /// Resolve a path to its numeric identifier, creating a mapped entry on
    /// first sight.
    ///
    /// The root directory and anything above it map to the mount-point id.
    /// Paths outside the mounted tree are rejected.
    pub async fn path_to_id(&self, ctx: CallContext, path: &Path) -> Result<i64> {
        let root = &self.config.root_path;

        if path == root || root.starts_with(path) {
            return Ok(self.config.mount_folder_id);
        }
        if !path.starts_with(root) {
            return Err(MountError::invalid_operation(format!(
                "path {} is outside the mounted root {}",
                path.display(),
                root.display()
            )));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|_| MountError::not_found(format!("no file at {}", path.display())))?;
        let kind = if metadata.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        };

        let entry = {
            let _guard = self.create_lock.lock().await;
            self.identity.get_or_create(path, kind).await?
        };

        if !ctx.is_internal()
            && !self
                .gate
                .check(entry.group_id, entry.kind, entry.id, Action::View)
        {
            return Err(MountError::not_found(format!(
                "no file at {}",
                path.display()
            )));
        }

        Ok(entry.id)
    }

    /// Resolve a digest key to its path.
    ///
    /// When the key misses while a reindex is in flight, the walker's
    /// partial buffer is scanned before giving up with the retryable
    /// `IndexingInProgress`.
    pub async fn resolve_key(&self, key: &str) -> Result<PathBuf> {
        match self.digest.resolve(key).await {
            Err(MountError::IndexingInProgress) => {
                for path in self.indexer.in_flight_paths() {
                    if DigestMapper::compute_key(&path) == key {
                        return Ok(path);
                    }
                }
                Err(MountError::IndexingInProgress)
            }
            other => other,
        }
    }

    /// Drop everything recorded for a path: the identity entry (if any) and
    /// the digest association. Used when a file is removed outside the
    /// mutating operations below.
    pub async fn forget(&self, path: &Path) -> Result<()> {
        if let Some(entry) = self.identity.by_path(path).await? {
            self.identity.delete(entry.id).await?;
        } else {
            self.digest.forget(path).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Subfolders of a folder, lazily mapped. Entries the caller may not
    /// view are filtered out, never surfaced as errors.
    pub async fn list_folders(
        &self,
        ctx: CallContext,
        cache: &mut ListingCache,
        folder_id: i64,
    ) -> Result<Vec<MappedEntry>> {
        self.list_children(ctx, cache, folder_id, EntryKind::Folder)
            .await
    }

    /// Files directly inside a folder, lazily mapped.
    pub async fn list_files(
        &self,
        ctx: CallContext,
        cache: &mut ListingCache,
        folder_id: i64,
    ) -> Result<Vec<MappedEntry>> {
        self.list_children(ctx, cache, folder_id, EntryKind::File)
            .await
    }

    async fn list_children(
        &self,
        ctx: CallContext,
        cache: &mut ListingCache,
        folder_id: i64,
        kind: EntryKind,
    ) -> Result<Vec<MappedEntry>> {
        let dir = self.id_to_path(ctx, folder_id).await?;
        let raw = list_dir(cache, &dir)?;

        let mut entries = Vec::new();
        for item in raw.iter().filter(|e| e.kind == kind) {
            let entry = {
                let _guard = self.create_lock.lock().await;
                self.identity.get_or_create(&item.path, item.kind).await?
            };
            if !ctx.is_internal()
                && !self
                    .gate
                    .check(entry.group_id, entry.kind, entry.id, Action::View)
            {
                continue;
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a subdirectory and map it.
    pub async fn create_folder(
        &self,
        ctx: CallContext,
        parent_id: i64,
        name: &str,
    ) -> Result<MappedEntry> {
        validate_name(name)?;

        let parent = self.id_to_path(ctx, parent_id).await?;
        if !ctx.is_internal()
            && !self
                .gate
                .check(self.config.group_id, EntryKind::Folder, parent_id, Action::Add)
        {
            return Err(MountError::PermissionDenied);
        }

        let target = parent.join(name);
        if target.exists() {
            return Err(MountError::invalid_operation(format!(
                "{} already exists",
                target.display()
            )));
        }

        std::fs::create_dir(&target)?;
        info!(parent_id, name, path = %target.display(), "Folder created");

        let _guard = self.create_lock.lock().await;
        self.identity.get_or_create(&target, EntryKind::Folder).await
    }

    /// Rename an entry in place. The numeric id is preserved; for folders,
    /// every mapped descendant is rebased onto the new path.
    pub async fn rename(&self, ctx: CallContext, id: i64, new_name: &str) -> Result<MappedEntry> {
        validate_name(new_name)?;

        let old_path = self.id_to_path(ctx, id).await?;
        if old_path == self.config.root_path {
            return Err(MountError::invalid_operation("cannot rename the mount point"));
        }
        let parent = old_path
            .parent()
            .ok_or_else(|| MountError::invalid_operation("entry has no parent"))?;
        let new_path = parent.join(new_name);

        self.relocate(ctx, id, &old_path, new_path).await
    }

    /// Move an entry into another folder of the same mounted tree, keeping
    /// its name and numeric id.
    pub async fn move_entry(
        &self,
        ctx: CallContext,
        id: i64,
        new_parent_id: i64,
    ) -> Result<MappedEntry> {
        let old_path = self.id_to_path(ctx, id).await?;
        if old_path == self.config.root_path {
            return Err(MountError::invalid_operation("cannot move the mount point"));
        }

        let new_parent = self.id_to_path(ctx, new_parent_id).await?;
        if !new_parent.is_dir() {
            return Err(MountError::invalid_operation(format!(
                "target {} is not a folder",
                new_parent.display()
            )));
        }
        if new_parent.starts_with(&old_path) {
            return Err(MountError::invalid_operation(
                "cannot move a folder into its own subtree",
            ));
        }

        let name = old_path
            .file_name()
            .ok_or_else(|| MountError::invalid_operation("entry has no name"))?;
        let new_path = new_parent.join(name);

        self.relocate(ctx, id, &old_path, new_path).await
    }

    /// Delete an entry: the filesystem object, its record and every mapped
    /// descendant.
    pub async fn delete(&self, ctx: CallContext, id: i64) -> Result<()> {
        let path = self.id_to_path(ctx, id).await?;
        if path == self.config.root_path {
            return Err(MountError::invalid_operation("cannot delete the mount point"));
        }

        let entry = self.entry_by_id(ctx, id).await?;
        if !ctx.is_internal()
            && !self.gate.check(entry.group_id, entry.kind, id, Action::Delete)
        {
            return Err(MountError::PermissionDenied);
        }

        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
            for descendant in self
                .store
                .entry_list_prefix(self.config.repository_id, &path_str(&path))
                .await?
            {
                self.store.entry_delete(descendant.id).await?;
            }
        } else {
            std::fs::remove_file(&path)?;
        }

        self.identity.delete(id).await?;
        info!(id, path = %path.display(), "Entry deleted");
        Ok(())
    }

    /// Shared tail of rename/move: filesystem rename, record update, subtree
    /// rebase. If the record update fails the filesystem rename is undone so
    /// disk and mapping cannot drift apart.
    async fn relocate(
        &self,
        ctx: CallContext,
        id: i64,
        old_path: &Path,
        new_path: PathBuf,
    ) -> Result<MappedEntry> {
        let entry = self.entry_by_id(ctx, id).await?;
        if !ctx.is_internal()
            && !self.gate.check(entry.group_id, entry.kind, id, Action::Update)
        {
            return Err(MountError::PermissionDenied);
        }

        if new_path == old_path {
            return Ok(entry);
        }
        if new_path.exists() {
            return Err(MountError::invalid_operation(format!(
                "{} already exists",
                new_path.display()
            )));
        }
        if !new_path.starts_with(&self.config.root_path) {
            return Err(MountError::invalid_operation(format!(
                "target {} is outside the mounted root",
                new_path.display()
            )));
        }

        std::fs::rename(old_path, &new_path)?;

        let updated = match self.identity.update_path(id, &new_path).await {
            Ok(updated) => updated,
            Err(e) => {
                // Compensate: put the file back so the old mapping stays true.
                if let Err(undo) = std::fs::rename(&new_path, old_path) {
                    warn!(
                        id,
                        old = %old_path.display(),
                        new = %new_path.display(),
                        error = %undo,
                        "Cannot undo filesystem rename after failed record update"
                    );
                }
                return Err(e);
            }
        };

        if entry.kind == EntryKind::Folder {
            self.rebase_descendants(old_path, &new_path).await?;
        }

        info!(
            id,
            old = %old_path.display(),
            new = %new_path.display(),
            "Entry relocated"
        );
        Ok(updated)
    }

    /// Rewrite recorded paths (and digest keys) of everything below a moved
    /// folder.
    async fn rebase_descendants(&self, old_dir: &Path, new_dir: &Path) -> Result<()> {
        let descendants = self
            .store
            .entry_list_prefix(self.config.repository_id, &path_str(old_dir))
            .await?;

        for record in descendants {
            let old_child = PathBuf::from(&record.path);
            let suffix = match old_child.strip_prefix(old_dir) {
                Ok(suffix) => suffix,
                Err(_) => continue,
            };
            let new_child = new_dir.join(suffix);
            self.identity.update_path(record.id, &new_child).await?;
        }
        Ok(())
    }
}

/// A legal entry name: non-empty, no separators, no traversal.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MountError::invalid_operation("name must not be empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(MountError::invalid_operation(format!(
            "name must not contain a path separator: {name}"
        )));
    }
    if name == "." || name == ".." {
        return Err(MountError::invalid_operation(format!(
            "name must not be a traversal component: {name}"
        )));
    }
    Ok(())
}
