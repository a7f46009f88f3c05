//! Core types for the mapping layer.

use crate::error::{MountError, Result};
use fsmount_store::EntryRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of a mapped filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Folder => "folder",
            EntryKind::File => "file",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "folder" => Ok(EntryKind::Folder),
            "file" => Ok(EntryKind::File),
            other => Err(MountError::invalid_operation(format!(
                "unknown entry kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked filesystem object with an assigned numeric identifier.
///
/// The id never changes across renames and moves; only `path` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedEntry {
    /// Portal-visible numeric identifier.
    pub id: i64,
    /// Digest key of the current path.
    pub key: String,
    /// Current absolute on-disk location.
    pub path: PathBuf,
    /// Tenant scoping, copied at creation time.
    pub company_id: i64,
    pub group_id: i64,
    pub repository_id: i64,
    /// Folder or file.
    pub kind: EntryKind,
}

impl MappedEntry {
    pub(crate) fn from_record(record: EntryRecord) -> Result<Self> {
        let kind = EntryKind::parse(&record.kind)?;
        Ok(Self {
            id: record.id,
            key: record.digest_key,
            path: PathBuf::from(record.path),
            company_id: record.company_id,
            group_id: record.group_id,
            repository_id: record.repository_id,
            kind,
        })
    }

    /// Entry name: final path component.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Explicit per-call context threaded through the resolver.
///
/// Internal calls (reindexing, the resolver's own bookkeeping) bypass the
/// permission gate. This is deliberately a value passed at every call site,
/// never ambient thread-local state, so a bypass is visible where it happens
/// and cannot leak across unrelated requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    internal: bool,
}

impl CallContext {
    /// Context for an inbound portal operation; permission-checked.
    pub fn external() -> Self {
        Self { internal: false }
    }

    /// Context for the core's own calls; skips the permission gate.
    pub fn internal() -> Self {
        Self { internal: true }
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }
}

/// Action submitted to the host portal's permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Add,
    Update,
    Delete,
}

/// Capability check consumed from the host portal.
///
/// The core supplies the identifiers and never implements authorization
/// logic itself. A denial on a read path is reported to callers as
/// `NotFound` so the existence of unviewable objects is not leaked.
pub trait PermissionGate: Send + Sync {
    fn check(&self, group_id: i64, kind: EntryKind, id: i64, action: Action) -> bool;
}

/// Gate that approves everything. Default for embedders without a portal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn check(&self, _group_id: i64, _kind: EntryKind, _id: i64, _action: Action) -> bool {
        true
    }
}

/// Store representation of a path.
pub(crate) fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
