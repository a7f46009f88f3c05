//! Request-scoped directory listing cache.
//!
//! One inbound portal operation often derives both its "list folders" and
//! "list files" views from the same raw directory scan. The cache keeps the
//! raw listing for the duration of that one request so the directory is read
//! from disk once. It is an ordinary value owned by the request context:
//! created by the caller, passed explicitly into each listing call, dropped
//! when the request ends. It is never shared across requests and the
//! background reindexer never touches it.

use crate::error::Result;
use crate::types::EntryKind;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::debug;

/// One raw directory entry as read from disk.
#[derive(Debug, Clone)]
pub struct RawDirEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub modified_ms: i64,
}

/// Cache of raw directory listings, scoped to one logical request.
#[derive(Debug, Default)]
pub struct ListingCache {
    listings: HashMap<PathBuf, Arc<Vec<RawDirEntry>>>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached listing for a directory, if this request already scanned it.
    pub fn get(&self, dir: &Path) -> Option<Arc<Vec<RawDirEntry>>> {
        self.listings.get(dir).cloned()
    }

    /// Store a listing and return a shared handle to it.
    pub fn put(&mut self, dir: &Path, entries: Vec<RawDirEntry>) -> Arc<Vec<RawDirEntry>> {
        let entries = Arc::new(entries);
        self.listings.insert(dir.to_path_buf(), entries.clone());
        entries
    }

    /// Number of directories cached so far in this request.
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

/// Read a directory through the cache: one disk scan per request.
pub fn list_dir(cache: &mut ListingCache, dir: &Path) -> Result<Arc<Vec<RawDirEntry>>> {
    if let Some(cached) = cache.get(dir) {
        debug!(dir = %dir.display(), "Listing served from request cache");
        return Ok(cached);
    }
    let entries = read_dir_raw(dir)?;
    Ok(cache.put(dir, entries))
}

/// Scan a directory from disk, sorted by name. Entries whose metadata cannot
/// be read (e.g. dangling symlinks) are skipped.
fn read_dir_raw(dir: &Path) -> Result<Vec<RawDirEntry>> {
    let mut entries = Vec::new();
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let metadata = match item.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %item.path().display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let kind = if metadata.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        entries.push(RawDirEntry {
            name: item.file_name().to_string_lossy().into_owned(),
            path: item.path(),
            kind,
            size: metadata.len(),
            modified_ms,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
