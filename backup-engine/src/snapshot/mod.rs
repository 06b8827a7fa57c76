//! Snapshot directories under a destination root.
//!
//! A snapshot is a directory named `<prefix><timestamp>` directly under the
//! destination root. The timestamp in the name is authoritative for its age;
//! directory modification times are not consulted.

pub mod naming;
pub mod retention;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use naming::{SnapshotNamer, TIMESTAMP_FORMAT};
pub use retention::{enforce, RetentionError, RetentionReport};

/// One snapshot directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub path: PathBuf,
    pub created_at: Option<NaiveDateTime>,
}

impl Snapshot {
    fn new(name: String, path: PathBuf, prefix: &str) -> Self {
        let created_at = naming::parse_timestamp(&name, prefix);
        Self {
            name,
            path,
            created_at,
        }
    }
}

/// List the immediate subdirectories of `destination_root` whose name starts
/// with `prefix`, oldest first.
///
/// A missing destination root yields an empty list.
pub fn list_snapshots(destination_root: &Path, prefix: &str) -> io::Result<Vec<Snapshot>> {
    let entries = match fs::read_dir(destination_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut snapshots = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        // Names that are not valid UTF-8 cannot carry our prefix.
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };

        if name.starts_with(prefix) {
            snapshots.push(Snapshot::new(name, entry.path(), prefix));
        }
    }

    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snapshots)
}
