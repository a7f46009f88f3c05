//! Row types for the store layer.

use serde::{Deserialize, Serialize};

/// Entry kinds accepted by the `fsmount_entries.kind` column.
pub(crate) const KIND_FOLDER: &str = "folder";
pub(crate) const KIND_FILE: &str = "file";

/// A persisted identity entry: one filesystem object known to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Portal-visible numeric identifier. Never changes once assigned.
    pub id: i64,
    /// Owning repository instance.
    pub repository_id: i64,
    /// Tenant (company) the entry belongs to.
    pub company_id: i64,
    /// Group scope copied at creation time.
    pub group_id: i64,
    /// Digest key of the path at the time of the last update.
    pub digest_key: String,
    /// Current absolute on-disk location. Mutable: updated on move/rename.
    pub path: String,
    /// "folder" or "file".
    pub kind: String,
    /// Creation time (ms since epoch).
    pub created_at: i64,
    /// Last update time (ms since epoch).
    pub updated_at: i64,
}

/// Fields required to insert a new identity entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: i64,
    pub repository_id: i64,
    pub company_id: i64,
    pub group_id: i64,
    pub digest_key: String,
    pub path: String,
    pub kind: String,
}

/// Outcome of a first-writer-wins mapping insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingOutcome {
    /// The key was not mapped before; the association was written.
    Inserted,
    /// The key was already mapped. Carries the stored path, which may differ
    /// from the offered one (a digest collision).
    AlreadyMapped(String),
}
