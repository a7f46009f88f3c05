//! Background reindexer: full-tree recovery and repair of the path mapping.
//!
//! A run walks the whole tree depth-first, accumulates every visited path in
//! an in-memory buffer and commits the buffer to the digest mapper as the
//! repository's new mapping set, inserting unseen paths and pruning
//! associations the walk no longer found — but only when the walk finished
//! without cancellation. At most
//! one run per repository may be active at a time, across processes, enforced
//! through the store's expiring lock; a crashed run cannot block recovery
//! past the lock TTL.

use crate::digest::DigestMapper;
use crate::error::Result;
use fsmount_store::{RepoStore, DEFAULT_LOCK_TTL};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Execution mode for a reindex run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexMode {
    /// Block the caller until the walk and commit finish.
    Sync,
    /// Run the walk on a background task; the call returns once the request
    /// is accepted. Failures are observable via logs only.
    Async,
}

/// Cooperative cancellation flag, checked between visited filesystem nodes.
///
/// Best-effort: an in-flight directory listing is not interrupted mid-call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Lock scope for reindexing one repository instance.
pub(crate) fn reindex_scope(repository_id: i64) -> String {
    format!("fsmount:reindex:{repository_id}")
}

/// Full-tree reindexer for one mounted root.
#[derive(Clone)]
pub struct Reindexer {
    store: RepoStore,
    mapper: DigestMapper,
    root: PathBuf,
    repository_id: i64,
    cancel: CancelFlag,
    in_flight: Arc<Mutex<Vec<PathBuf>>>,
}

impl Reindexer {
    pub fn new(store: RepoStore, mapper: DigestMapper, root: PathBuf, repository_id: i64) -> Self {
        Self {
            store,
            mapper,
            root,
            repository_id,
            cancel: CancelFlag::default(),
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Whether a reindex currently holds the lock for this repository, in
    /// this process or any other.
    pub async fn is_running(&self) -> Result<bool> {
        Ok(self
            .store
            .lock_is_held(&reindex_scope(self.repository_id))
            .await?)
    }

    /// Signal the active run (if any) to stop at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Snapshot of the paths visited so far by the in-flight walk.
    ///
    /// Lets lookups that miss during a reindex scan the partial result
    /// instead of waiting for the commit.
    pub fn in_flight_paths(&self) -> Vec<PathBuf> {
        self.in_flight
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    /// Run a full-tree reindex.
    ///
    /// Returns `false` when skipped because another run holds the lock, or
    /// (in sync mode) when the walk failed or was cancelled. Async mode
    /// returns `true` as soon as the lock is held and the task is spawned.
    pub async fn reindex(&self, mode: ReindexMode) -> bool {
        let scope = reindex_scope(self.repository_id);
        let holder = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

        let acquired = match self
            .store
            .lock_try_acquire(&scope, &holder, DEFAULT_LOCK_TTL)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "Cannot acquire reindex lock");
                return false;
            }
        };
        if !acquired {
            info!(
                root = %self.root.display(),
                "Skipping reindex because another reindex is in process"
            );
            return false;
        }

        self.cancel.reset();

        match mode {
            ReindexMode::Sync => {
                let committed = self.run_locked().await;
                self.release(&scope, &holder).await;
                committed
            }
            ReindexMode::Async => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.run_locked().await;
                    this.release(&scope, &holder).await;
                });
                true
            }
        }
    }

    /// Walk and commit while holding the lock. Returns true if a complete
    /// walk was committed.
    async fn run_locked(&self) -> bool {
        info!(root = %self.root.display(), "Indexing filesystem repository");

        if let Ok(mut buffer) = self.in_flight.lock() {
            buffer.clear();
        }

        let root = self.root.clone();
        let cancel = self.cancel.clone();
        let in_flight = self.in_flight.clone();
        let walk = tokio::task::spawn_blocking(move || walk_tree(&root, &cancel, &in_flight)).await;

        let completed = match walk {
            Ok(completed) => completed,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "Reindex walk task failed");
                false
            }
        };

        if !completed {
            // Only a complete, uninterrupted walk commits.
            info!(root = %self.root.display(), "Reindex walk cancelled; discarding partial buffer");
            if let Ok(mut buffer) = self.in_flight.lock() {
                buffer.clear();
            }
            return false;
        }

        let paths = match self.in_flight.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        };

        match self.mapper.bulk_persist(&paths).await {
            Ok((inserted, pruned)) => {
                info!(
                    root = %self.root.display(),
                    visited = paths.len(),
                    inserted,
                    pruned,
                    "Indexing filesystem repository finished"
                );
                true
            }
            Err(e) => {
                error!(
                    root = %self.root.display(),
                    error = %e,
                    "Cannot commit reindex buffer"
                );
                false
            }
        }
    }

    /// Release the reindex lock; always runs, regardless of outcome.
    async fn release(&self, scope: &str, holder: &str) {
        if let Err(e) = self.store.lock_release(scope, holder).await {
            error!(
                root = %self.root.display(),
                error = %e,
                "Cannot release reindex lock"
            );
        }
    }
}

/// Depth-first walk, accumulating every visited path. Returns false if the
/// run was cancelled before the walk finished.
fn walk_tree(root: &Path, cancel: &CancelFlag, buffer: &Mutex<Vec<PathBuf>>) -> bool {
    for entry in WalkDir::new(root).follow_links(false) {
        if cancel.is_cancelled() {
            return false;
        }
        match entry {
            Ok(entry) => {
                debug!(path = %entry.path().display(), "Indexing");
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.push(entry.into_path());
                }
            }
            Err(e) => {
                // Unreadable subtrees are logged and skipped; the walk goes on.
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry during reindex");
            }
        }
    }
    true
}
