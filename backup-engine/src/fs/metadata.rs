//! File metadata carried from source to snapshot.
//!
//! The snapshot copy keeps the source's modification time and, on Unix, its
//! permission bits. Snapshot age is never derived from these timestamps.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::warn;

/// Metadata captured from a source file before copying
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time
    pub modified: SystemTime,

    /// File permissions (Unix mode bits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Extract metadata from a file path (symlinks are followed)
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified()?,
            permissions,
        })
    }

    /// Apply the modification time (and permissions where supported) to `path`.
    ///
    /// Only a failure to set the modification time is an error.
    pub fn apply_to_path(&self, path: &Path) -> std::io::Result<()> {
        // futimens only needs ownership, so a read-only handle works for read-only sources.
        #[cfg(unix)]
        let file = fs::File::open(path)?;

        #[cfg(not(unix))]
        let file = fs::OpenOptions::new().write(true).open(path)?;

        file.set_modified(self.modified)?;
        drop(file);

        // Many backup volumes (FAT, exFAT, SMB) reject chmod. The copy is
        // complete without the mode bits, so this is only worth a warning.
        #[cfg(unix)]
        if let Some(mode) = self.permissions {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
                warn!(path = %path.display(), mode, error = %e, "Cannot restore permissions");
            }
        }

        Ok(())
    }
}
