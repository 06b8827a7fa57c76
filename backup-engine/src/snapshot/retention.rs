//! Retention: keep the newest `max_snapshots` snapshots for a prefix.
//!
//! Failures never abort the sweep. A snapshot that cannot be removed is
//! reported and the remaining candidates are still attempted.

use super::{list_snapshots, Snapshot};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A snapshot (or the listing itself) that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionError {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for RetentionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Result of one retention sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub deleted: Vec<PathBuf>,
    pub errors: Vec<RetentionError>,
    /// Snapshots matching the prefix that are still on disk afterwards
    pub kept: usize,
}

/// Delete the oldest snapshots for `prefix` until at most `max_snapshots` remain.
///
/// A `max_snapshots` of zero is treated as one; a sweep never removes every
/// snapshot.
pub fn enforce(destination_root: &Path, prefix: &str, max_snapshots: usize) -> RetentionReport {
    sweep(destination_root, prefix, max_snapshots, |path| fs::remove_dir_all(path))
}

fn sweep<F>(destination_root: &Path, prefix: &str, max_snapshots: usize, mut remove: F) -> RetentionReport
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut report = RetentionReport::default();
    let max_snapshots = max_snapshots.max(1);

    let snapshots = match list_snapshots(destination_root, prefix) {
        Ok(snapshots) => snapshots,
        Err(e) => {
            warn!(root = %destination_root.display(), error = %e, "Cannot list snapshots");
            report.errors.push(RetentionError {
                path: destination_root.to_path_buf(),
                message: e.to_string(),
            });
            return report;
        }
    };

    let excess = snapshots.len().saturating_sub(max_snapshots);
    report.kept = snapshots.len() - excess;

    for Snapshot { path, name, .. } in snapshots.into_iter().take(excess) {
        match remove(&path) {
            Ok(()) => {
                info!(snapshot = %name, "Deleted old snapshot");
                report.deleted.push(path);
            }
            Err(e) => {
                warn!(snapshot = %name, error = %e, "Failed to delete old snapshot");
                report.errors.push(RetentionError {
                    path,
                    message: e.to_string(),
                });
                report.kept += 1;
            }
        }
    }

    info!(
        prefix,
        max_snapshots,
        deleted = report.deleted.len(),
        failed = report.errors.len(),
        kept = report.kept,
        "Retention sweep finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_snapshots(root: &Path, names: &[&str]) -> std::io::Result<()> {
        for name in names {
            let dir = root.join(name);
            fs::create_dir_all(dir.join("photos"))?;
            fs::write(dir.join("photos/img.jpg"), b"jpeg")?;
        }
        Ok(())
    }

    fn remaining(root: &Path, prefix: &str) -> Vec<String> {
        list_snapshots(root, prefix)
            .map(|s| s.into_iter().map(|s| s.name).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_evicts_oldest_beyond_limit() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        make_snapshots(
            temp.path(),
            &["B_20240101_000000", "B_20240102_000000", "B_20240103_000000"],
        )?;

        let report = enforce(temp.path(), "B_", 2);

        assert_eq!(report.deleted, vec![temp.path().join("B_20240101_000000")]);
        assert!(report.errors.is_empty());
        assert_eq!(report.kept, 2);
        assert_eq!(
            remaining(temp.path(), "B_"),
            vec!["B_20240102_000000", "B_20240103_000000"]
        );
        Ok(())
    }

    #[test]
    fn test_under_limit_deletes_nothing() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        make_snapshots(temp.path(), &["B_20240101_000000"])?;

        let report = enforce(temp.path(), "B_", 5);

        assert!(report.deleted.is_empty());
        assert_eq!(report.kept, 1);
        Ok(())
    }

    #[test]
    fn test_other_prefixes_untouched() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        make_snapshots(
            temp.path(),
            &[
                "Backup_20240101_000000",
                "Backup_20240102_000000",
                "DBBackup_20230101_000000",
                "DBBackup_20230102_000000",
            ],
        )?;

        enforce(temp.path(), "Backup_", 1);

        assert_eq!(remaining(temp.path(), "Backup_"), vec!["Backup_20240102_000000"]);
        assert_eq!(remaining(temp.path(), "DBBackup_").len(), 2);
        Ok(())
    }

    #[test]
    fn test_zero_limit_keeps_newest() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        make_snapshots(temp.path(), &["B_20240101_000000", "B_20240102_000000"])?;

        enforce(temp.path(), "B_", 0);

        assert_eq!(remaining(temp.path(), "B_"), vec!["B_20240102_000000"]);
        Ok(())
    }

    #[test]
    fn test_failed_deletion_does_not_stop_the_sweep() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        make_snapshots(
            temp.path(),
            &[
                "B_20240101_000000",
                "B_20240102_000000",
                "B_20240103_000000",
                "B_20240104_000000",
            ],
        )?;
        let locked = temp.path().join("B_20240101_000000");

        let report = sweep(temp.path(), "B_", 1, |path| {
            if path == locked {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "file in use"))
            } else {
                fs::remove_dir_all(path)
            }
        });

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, locked);
        assert_eq!(
            report.deleted,
            vec![
                temp.path().join("B_20240102_000000"),
                temp.path().join("B_20240103_000000"),
            ]
        );
        assert_eq!(report.kept, 2);
        assert_eq!(
            remaining(temp.path(), "B_"),
            vec!["B_20240101_000000", "B_20240104_000000"]
        );
        Ok(())
    }

    #[test]
    fn test_missing_root_reports_nothing_to_do() {
        let report = enforce(Path::new("/definitely/not/here"), "B_", 1);
        assert!(report.deleted.is_empty());
        assert!(report.errors.is_empty());
        assert_eq!(report.kept, 0);
    }
}
