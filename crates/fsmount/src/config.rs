//! Configuration surface for one mounted repository instance.

use crate::error::{MountError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration for one mounted tree.
///
/// `mount_folder_id` is the portal-assigned identifier of the mount-point
/// folder; the root directory resolves to it instead of to an ordinary
/// mapped entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    /// Absolute path of the exposed root directory. Must exist and be
    /// readable; a non-writable root enables read-only mount mode.
    pub root_path: PathBuf,
    /// SQLite database backing the identity and mapping tables.
    pub database_path: PathBuf,
    /// Repository instance owning all persisted rows.
    pub repository_id: i64,
    /// Tenant scoping copied onto new entries.
    pub company_id: i64,
    pub group_id: i64,
    /// Identifier of the host portal's mount-point folder.
    pub mount_folder_id: i64,
    /// Run one asynchronous reindex when the resolver starts.
    #[serde(default)]
    pub reindex_on_startup: bool,
}

impl MountConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: MountConfig = toml::from_str(&raw)
            .map_err(|e| MountError::invalid_operation(format!("bad config file: {e}")))?;
        Ok(config)
    }

    /// Check the root directory and warn about read-only mounts.
    pub fn validate(&self) -> Result<()> {
        let root = &self.root_path;
        if !root.is_absolute() {
            return Err(MountError::invalid_operation(format!(
                "root path must be absolute: {}",
                root.display()
            )));
        }
        let metadata = std::fs::metadata(root).map_err(|e| {
            MountError::invalid_operation(format!(
                "root folder {} is not accessible: {e}",
                root.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(MountError::invalid_operation(format!(
                "root path is not a directory: {}",
                root.display()
            )));
        }
        // Readability check: a root we cannot list is unusable.
        std::fs::read_dir(root).map_err(|e| {
            MountError::invalid_operation(format!(
                "root folder {} is not readable: {e}",
                root.display()
            ))
        })?;
        if metadata.permissions().readonly() {
            warn!(
                root = %root.display(),
                "Root folder is not writable; mounting in read-only mode"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(root: PathBuf) -> MountConfig {
        MountConfig {
            root_path: root,
            database_path: PathBuf::from(":memory:"),
            repository_id: 1,
            company_id: 1,
            group_id: 1,
            mount_folder_id: 0,
            reindex_on_startup: false,
        }
    }

    #[test]
    fn validate_accepts_existing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(config_for(dir.path().to_path_buf()).validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let gone = dir.path().join("nope");
        assert!(config_for(gone).validate().is_err());
    }

    #[test]
    fn validate_rejects_file_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(config_for(file).validate().is_err());
    }

    #[test]
    fn load_parses_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg_path = dir.path().join("fsmount.toml");
        std::fs::write(
            &cfg_path,
            r#"
root_path = "/data"
database_path = "/var/lib/fsmount/fsmount.sqlite3"
repository_id = 42
company_id = 1
group_id = 2
mount_folder_id = 100
reindex_on_startup = true
"#,
        )
        .unwrap();

        let config = MountConfig::load(&cfg_path).unwrap();
        assert_eq!(config.repository_id, 42);
        assert!(config.reindex_on_startup);
        assert_eq!(config.root_path, PathBuf::from("/data"));
    }
}
