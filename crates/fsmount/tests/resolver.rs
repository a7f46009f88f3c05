//! Integration tests for the entry resolver: identifier stability across
//! mutations, root special-casing, stale detection and concurrency.

use fsmount::{
    Action, CallContext, EntryKind, EntryResolver, ListingCache, MountConfig, MountError,
    PermissionGate,
};
use fsmount_store::RepoStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const MOUNT_ID: i64 = 100;

fn config_for(root: PathBuf) -> MountConfig {
    MountConfig {
        root_path: root,
        database_path: PathBuf::from(":memory:"),
        repository_id: 7,
        company_id: 1,
        group_id: 2,
        mount_folder_id: MOUNT_ID,
        reindex_on_startup: false,
    }
}

async fn setup() -> (TempDir, RepoStore, Arc<EntryResolver>) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let store = RepoStore::open_in_memory().await.unwrap();
    let resolver = EntryResolver::new(config_for(root), store.clone())
        .await
        .unwrap();
    (dir, store, Arc::new(resolver))
}

fn ctx() -> CallContext {
    CallContext::external()
}

#[tokio::test]
async fn round_trip_for_new_paths() {
    let (_dir, _store, resolver) = setup().await;
    let docs = resolver.root().join("docs");
    std::fs::create_dir(&docs).unwrap();

    let id = resolver.path_to_id(ctx(), &docs).await.unwrap();
    assert_eq!(resolver.id_to_path(ctx(), id).await.unwrap(), docs);

    // Same path, same id.
    assert_eq!(resolver.path_to_id(ctx(), &docs).await.unwrap(), id);
}

#[tokio::test]
async fn root_maps_to_the_mount_point() {
    let (_dir, _store, resolver) = setup().await;
    let root = resolver.root().to_path_buf();

    assert_eq!(resolver.path_to_id(ctx(), &root).await.unwrap(), MOUNT_ID);
    assert_eq!(resolver.id_to_path(ctx(), MOUNT_ID).await.unwrap(), root);

    // The segment above the root also resolves to the mount point, not to a
    // created entry.
    let parent = root.parent().unwrap().to_path_buf();
    assert_eq!(resolver.path_to_id(ctx(), &parent).await.unwrap(), MOUNT_ID);
}

#[tokio::test]
async fn paths_outside_the_root_are_rejected() {
    let (_dir, _store, resolver) = setup().await;
    let outside = TempDir::new().unwrap();
    let foreign = outside.path().canonicalize().unwrap().join("file.txt");
    std::fs::write(&foreign, "x").unwrap();

    let err = resolver.path_to_id(ctx(), &foreign).await.unwrap_err();
    assert!(matches!(err, MountError::InvalidOperation(_)));
}

#[tokio::test]
async fn missing_path_is_not_mapped() {
    let (_dir, store, resolver) = setup().await;
    let ghost = resolver.root().join("ghost.txt");

    let err = resolver.path_to_id(ctx(), &ghost).await.unwrap_err();
    assert!(matches!(err, MountError::NotFound(_)));
    assert_eq!(store.entry_count(7).await.unwrap(), 0);
}

#[tokio::test]
async fn unissued_id_is_not_found() {
    let (_dir, _store, resolver) = setup().await;
    let err = resolver.id_to_path(ctx(), 424242).await.unwrap_err();
    assert!(matches!(err, MountError::NotFound(_)));
}

#[tokio::test]
async fn ids_are_stable_under_rename_and_move() {
    let (_dir, _store, resolver) = setup().await;
    let root = resolver.root().to_path_buf();

    std::fs::create_dir(root.join("docs")).unwrap();
    std::fs::write(root.join("docs").join("readme.txt"), "hello").unwrap();

    let docs_id = resolver.path_to_id(ctx(), &root.join("docs")).await.unwrap();
    let readme_id = resolver
        .path_to_id(ctx(), &root.join("docs").join("readme.txt"))
        .await
        .unwrap();
    assert_ne!(docs_id, readme_id);

    // Rename the folder; the file inside follows without a new id.
    let renamed = resolver.rename(ctx(), docs_id, "documents").await.unwrap();
    assert_eq!(renamed.id, docs_id);
    assert_eq!(renamed.path, root.join("documents"));

    assert_eq!(
        resolver.id_to_path(ctx(), readme_id).await.unwrap(),
        root.join("documents").join("readme.txt")
    );
    assert_eq!(
        resolver
            .path_to_id(ctx(), &root.join("documents"))
            .await
            .unwrap(),
        docs_id
    );

    // Move the file into a sibling folder; id survives again.
    std::fs::create_dir(root.join("archive")).unwrap();
    let archive_id = resolver
        .path_to_id(ctx(), &root.join("archive"))
        .await
        .unwrap();
    let moved = resolver
        .move_entry(ctx(), readme_id, archive_id)
        .await
        .unwrap();
    assert_eq!(moved.id, readme_id);
    assert_eq!(moved.path, root.join("archive").join("readme.txt"));
    assert_eq!(
        resolver.id_to_path(ctx(), readme_id).await.unwrap(),
        root.join("archive").join("readme.txt")
    );
}

#[tokio::test]
async fn rename_rejects_separators_and_conflicts() {
    let (_dir, _store, resolver) = setup().await;
    let root = resolver.root().to_path_buf();
    std::fs::create_dir(root.join("a")).unwrap();
    std::fs::create_dir(root.join("b")).unwrap();
    let a = resolver.path_to_id(ctx(), &root.join("a")).await.unwrap();

    let err = resolver.rename(ctx(), a, "x/y").await.unwrap_err();
    assert!(matches!(err, MountError::InvalidOperation(_)));

    let err = resolver.rename(ctx(), a, "b").await.unwrap_err();
    assert!(matches!(err, MountError::InvalidOperation(_)));

    // Nothing moved on disk.
    assert!(root.join("a").is_dir());
}

#[tokio::test]
async fn moving_a_folder_into_its_subtree_is_rejected() {
    let (_dir, _store, resolver) = setup().await;
    let root = resolver.root().to_path_buf();
    std::fs::create_dir_all(root.join("top").join("inner")).unwrap();

    let top = resolver.path_to_id(ctx(), &root.join("top")).await.unwrap();
    let inner = resolver
        .path_to_id(ctx(), &root.join("top").join("inner"))
        .await
        .unwrap();

    let err = resolver.move_entry(ctx(), top, inner).await.unwrap_err();
    assert!(matches!(err, MountError::InvalidOperation(_)));
}

#[tokio::test]
async fn stale_entry_then_not_found() {
    let (_dir, _store, resolver) = setup().await;
    let file = resolver.root().join("volatile.txt");
    std::fs::write(&file, "x").unwrap();

    let id = resolver.path_to_id(ctx(), &file).await.unwrap();

    // Delete out-of-band, not through the resolver.
    std::fs::remove_file(&file).unwrap();

    let err = resolver.id_to_path(ctx(), id).await.unwrap_err();
    assert!(matches!(err, MountError::StaleEntry { id: stale, .. } if stale == id));

    // Detection deleted the record; the id is now simply unknown.
    let err = resolver.id_to_path(ctx(), id).await.unwrap_err();
    assert!(matches!(err, MountError::NotFound(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn dangling_symlink_is_present_not_stale() {
    let (_dir, _store, resolver) = setup().await;
    let file = resolver.root().join("volatile.txt");
    std::fs::write(&file, "x").unwrap();

    let id = resolver.path_to_id(ctx(), &file).await.unwrap();

    // Swap the file for a symlink whose target is gone. The link itself is
    // still an on-disk object, so the record must survive the lookup.
    std::fs::remove_file(&file).unwrap();
    std::os::unix::fs::symlink(resolver.root().join("missing-target"), &file).unwrap();

    assert_eq!(resolver.id_to_path(ctx(), id).await.unwrap(), file);
    // And again: detection must not have deleted the record.
    assert_eq!(resolver.id_to_path(ctx(), id).await.unwrap(), file);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_allocate_one_id() {
    let (_dir, store, resolver) = setup().await;
    let file = resolver.root().join("contended.txt");
    std::fs::write(&file, "x").unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        let path = file.clone();
        handles.push(tokio::spawn(async move {
            resolver.path_to_id(CallContext::external(), &path).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    ids.dedup();
    assert_eq!(ids.len(), 1, "every racer must observe the same id");
    assert_eq!(store.entry_count(7).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_removes_subtree_records() {
    let (_dir, store, resolver) = setup().await;
    let root = resolver.root().to_path_buf();
    std::fs::create_dir(root.join("doomed")).unwrap();
    std::fs::write(root.join("doomed").join("file.txt"), "x").unwrap();

    let folder_id = resolver
        .path_to_id(ctx(), &root.join("doomed"))
        .await
        .unwrap();
    let file_id = resolver
        .path_to_id(ctx(), &root.join("doomed").join("file.txt"))
        .await
        .unwrap();

    resolver.delete(ctx(), folder_id).await.unwrap();

    assert!(!root.join("doomed").exists());
    assert!(matches!(
        resolver.id_to_path(ctx(), folder_id).await.unwrap_err(),
        MountError::NotFound(_)
    ));
    assert!(matches!(
        resolver.id_to_path(ctx(), file_id).await.unwrap_err(),
        MountError::NotFound(_)
    ));
    assert_eq!(store.entry_count(7).await.unwrap(), 0);
}

#[tokio::test]
async fn forget_drops_entry_and_association() {
    let (_dir, store, resolver) = setup().await;
    let file = resolver.root().join("note.txt");
    std::fs::write(&file, "x").unwrap();

    resolver.path_to_id(ctx(), &file).await.unwrap();
    resolver.forget(&file).await.unwrap();

    assert_eq!(store.entry_count(7).await.unwrap(), 0);
    assert_eq!(store.mapping_count(7).await.unwrap(), 0);
}

#[tokio::test]
async fn create_folder_maps_the_new_directory() {
    let (_dir, _store, resolver) = setup().await;

    let created = resolver
        .create_folder(ctx(), MOUNT_ID, "reports")
        .await
        .unwrap();
    assert_eq!(created.kind, EntryKind::Folder);
    assert!(resolver.root().join("reports").is_dir());
    assert_eq!(
        resolver.id_to_path(ctx(), created.id).await.unwrap(),
        resolver.root().join("reports")
    );

    let err = resolver
        .create_folder(ctx(), MOUNT_ID, "reports")
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::InvalidOperation(_)));
}

#[tokio::test]
async fn listing_reuses_one_disk_scan_per_request() {
    let (_dir, _store, resolver) = setup().await;
    let root = resolver.root().to_path_buf();
    std::fs::create_dir(root.join("sub")).unwrap();
    std::fs::write(root.join("a.txt"), "x").unwrap();
    std::fs::write(root.join("b.txt"), "y").unwrap();

    let mut cache = ListingCache::new();
    let folders = resolver
        .list_folders(ctx(), &mut cache, MOUNT_ID)
        .await
        .unwrap();
    let files = resolver
        .list_files(ctx(), &mut cache, MOUNT_ID)
        .await
        .unwrap();

    assert_eq!(folders.len(), 1);
    assert_eq!(files.len(), 2);
    // Both views came from the same raw listing.
    assert_eq!(cache.len(), 1);
}

/// Gate that hides files but not folders.
struct FoldersOnly;

impl PermissionGate for FoldersOnly {
    fn check(&self, _group_id: i64, kind: EntryKind, _id: i64, action: Action) -> bool {
        matches!(action, Action::View) && kind == EntryKind::Folder
    }
}

#[tokio::test]
async fn denied_reads_look_like_missing_objects() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let store = RepoStore::open_in_memory().await.unwrap();
    let resolver = EntryResolver::with_gate(config_for(root.clone()), store, Arc::new(FoldersOnly))
        .await
        .unwrap();

    std::fs::create_dir(root.join("visible")).unwrap();
    std::fs::write(root.join("secret.txt"), "x").unwrap();

    // Folder passes the gate.
    let folder_id = resolver
        .path_to_id(ctx(), &root.join("visible"))
        .await
        .unwrap();
    assert!(resolver.id_to_path(ctx(), folder_id).await.is_ok());

    // File is denied: surfaced as NotFound, not as a permission error.
    let err = resolver
        .path_to_id(ctx(), &root.join("secret.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::NotFound(_)));

    // Internal calls bypass the gate explicitly.
    let internal_id = resolver
        .path_to_id(CallContext::internal(), &root.join("secret.txt"))
        .await
        .unwrap();
    assert!(resolver
        .id_to_path(CallContext::internal(), internal_id)
        .await
        .is_ok());

    // Listing filters denied children instead of failing.
    let mut cache = ListingCache::new();
    let files = resolver
        .list_files(ctx(), &mut cache, MOUNT_ID)
        .await
        .unwrap();
    assert!(files.is_empty());
}
