//! Error taxonomy for the mapping core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Mapping core result type.
pub type Result<T> = std::result::Result<T, MountError>;

/// Mapping core error type.
///
/// Filesystem and store failures are logged with full context at the point
/// they occur and re-raised as one of these kinds; no failure that would
/// leave the mapping inconsistent is swallowed.
#[derive(Error, Debug)]
pub enum MountError {
    /// The identifier or key was never issued by this repository instance.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The identifier was issued but its backing file has disappeared from
    /// disk. The stale record has been deleted as a side effect of detection;
    /// a follow-up lookup for the same id yields `NotFound`.
    #[error("Entry {id} no longer present on disk: {path}")]
    StaleEntry { id: i64, path: PathBuf },

    /// A lookup missed while a reindex is underway; retry after a delay.
    #[error("Lookup failed while reindexing is in progress; retry later")]
    IndexingInProgress,

    /// A reindex was requested while another run holds the cross-process
    /// lock. Signals "skipped", not a hard failure. The core itself reports
    /// contention through [`Reindexer::reindex`]'s boolean return; this
    /// variant is the taxonomy slot for embedders whose calling convention
    /// needs the skip surfaced as an error.
    ///
    /// [`Reindexer::reindex`]: crate::indexer::Reindexer::reindex
    #[error("Another reindex already holds the lock for this repository")]
    LockContention,

    /// The caller may not perform a mutating operation on this entry.
    #[error("Permission denied")]
    PermissionDenied,

    /// Structural violation: bad name, path outside the mounted root, ...
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Durable store failure.
    #[error("Store error: {0}")]
    Store(#[from] fsmount_store::StoreError),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MountError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid operation error.
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}
