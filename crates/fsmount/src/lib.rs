//! fsmount - filesystem identity mapping and indexing core.
//!
//! Exposes a native filesystem tree as a document repository inside a host
//! portal whose document model addresses every folder and file by a stable
//! numeric identifier. This crate is the identity layer behind that: it
//! creates, persists, looks up and invalidates the bidirectional mapping
//! between filesystem paths and those identifiers, keeps it consistent
//! across renames, moves, deletions and concurrent access, and repairs it
//! with a background full-tree reindex.
//!
//! The adapter translating portal API calls into filesystem operations sits
//! on top of [`EntryResolver`]; permission decisions come from the host via
//! the [`PermissionGate`] seam.

pub mod config;
pub mod digest;
pub mod error;
pub mod identity;
pub mod indexer;
pub mod listing;
pub mod resolver;
pub mod types;

pub use config::MountConfig;
pub use digest::DigestMapper;
pub use error::{MountError, Result};
pub use identity::IdentityTable;
pub use indexer::{CancelFlag, ReindexMode, Reindexer};
pub use listing::{ListingCache, RawDirEntry};
pub use resolver::EntryResolver;
pub use types::{Action, AllowAll, CallContext, EntryKind, MappedEntry, PermissionGate};
