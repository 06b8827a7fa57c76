//! Recursive copy of one source tree into a snapshot subtree.
//!
//! Directories are only created on disk once the first file of the run has
//! been written in full, so a run that is cancelled (or finds nothing to
//! copy, or cannot write a single file) leaves no snapshot directory behind.

use crate::fs::exclude::ExclusionMatcher;
use crate::fs::metadata::FileMetadata;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A recoverable failure tied to a single filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub path: PathBuf,
    pub message: String,
}

impl EntryError {
    fn new(path: &Path, err: impl fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Outcome of copying one source tree.
#[derive(Debug, Clone, Default)]
pub struct CopyResult {
    pub files_copied: u64,
    pub bytes_copied: u64,
    /// Entries skipped by exclusion or because they are not regular files
    pub skipped: u64,
    pub errors: Vec<EntryError>,
    pub cancelled: bool,
}

/// How far a write failure reaches.
#[derive(Debug)]
enum WriteError {
    /// Nothing more can be written to this snapshot
    Lost(io::Error),
    /// Only the current entry is affected
    Entry(io::Error),
}

/// Destination side of a run: the snapshot directory and its lazily created
/// subdirectories.
#[derive(Debug)]
pub struct DestTree {
    destination_root: PathBuf,
    /// Source and target of directories waiting for the first file
    pending: Vec<(PathBuf, PathBuf)>,
    materialized: bool,
}

impl DestTree {
    /// `destination_root` is the directory holding all snapshots; it must
    /// already exist and is never created from here.
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            pending: Vec::new(),
            materialized: false,
        }
    }

    /// True once at least one file has been written.
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    fn add_dir(&mut self, source: &Path, target: PathBuf) -> io::Result<()> {
        if self.materialized {
            self.ensure_root()?;
            fs::create_dir_all(&target)
        } else {
            self.pending.push((source.to_path_buf(), target));
            Ok(())
        }
    }

    /// Create the directories `file` needs and return the topmost ones this
    /// call created, for [`DestTree::discard`].
    ///
    /// The snapshot directory and the source's subtree are created first.
    /// If either fails the whole snapshot is unwritable.
    fn prepare_file(&self, file: &Path, subtree: &Path) -> std::result::Result<Vec<PathBuf>, WriteError> {
        self.ensure_root().map_err(WriteError::Lost)?;

        let mut created = Vec::new();
        for dir in self.snapshot_dir(file).into_iter().chain(Some(subtree.to_path_buf())) {
            if let Err(e) = create_dir_tracked(&dir, &mut created) {
                self.discard(&created);
                return Err(WriteError::Lost(e));
            }
        }

        if let Some(parent) = file.parent() {
            if let Err(e) = create_dir_tracked(parent, &mut created) {
                self.discard(&created);
                return Err(self.classify(e));
            }
        }

        Ok(created)
    }

    /// Mark the snapshot as existing after its first complete file and
    /// create the directories queued until then.
    fn materialize(&mut self) -> Vec<(PathBuf, io::Error)> {
        if self.materialized {
            return Vec::new();
        }
        self.materialized = true;

        std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|(source, target)| fs::create_dir_all(&target).err().map(|e| (source, e)))
            .collect()
    }

    /// Remove directories created for a file that was never completed.
    fn discard(&self, created: &[PathBuf]) {
        for dir in created.iter().rev() {
            match fs::remove_dir_all(dir) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    warn!(path = %dir.display(), error = %e, "Cannot remove unused directory");
                }
                _ => {}
            }
        }
    }

    /// The snapshot directory `path` belongs to: its first component below
    /// the destination root.
    fn snapshot_dir(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.destination_root).ok()?;
        let first = relative.components().next()?;
        Some(self.destination_root.join(first))
    }

    fn ensure_root(&self) -> io::Result<()> {
        if self.destination_root.is_dir() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                "destination root is no longer reachable",
            ))
        }
    }

    fn is_destination_lost(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::StorageFull || !self.destination_root.is_dir()
    }

    fn classify(&self, err: io::Error) -> WriteError {
        if self.is_destination_lost(&err) {
            WriteError::Lost(err)
        } else {
            WriteError::Entry(err)
        }
    }

    fn lost(&self, err: io::Error) -> EngineError {
        EngineError::DestinationUnavailable {
            path: self.destination_root.clone(),
            source: err,
        }
    }
}

/// `create_dir_all` that records the topmost directory it had to create.
fn create_dir_tracked(dir: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let top = dir.ancestors().take_while(|d| !d.exists()).last();
    if let Some(top) = top {
        if !created.iter().any(|c| top.starts_with(c)) {
            created.push(top.to_path_buf());
        }
    }
    fs::create_dir_all(dir)
}

/// Copy `source` into `dest`, skipping excluded entries.
///
/// `is_cancelled` is polled before every entry; `on_progress` receives the
/// source path of each copied file and the bytes copied so far by this call.
/// Per-entry failures are collected in the result. A destination that
/// cannot be written at all (volume gone, disk full, snapshot directory
/// refused) is returned as an error.
pub fn copy_tree<P, C>(
    source: &Path,
    dest: &Path,
    matcher: &ExclusionMatcher,
    tree: &mut DestTree,
    mut on_progress: P,
    is_cancelled: C,
) -> Result<CopyResult>
where
    P: FnMut(&Path, u64),
    C: Fn() -> bool,
{
    let mut result = CopyResult::default();
    let mut walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    loop {
        if is_cancelled() {
            debug!(source = %source.display(), "Copy interrupted by cancellation");
            result.cancelled = true;
            break;
        }

        let entry = match walker.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                let path = e.path().unwrap_or(source).to_path_buf();
                warn!(path = %path.display(), error = %e, "Cannot read entry");
                result.errors.push(EntryError::new(&path, &e));
                continue;
            }
        };

        let path = entry.path();
        let file_type = entry.file_type();

        if matcher.is_excluded(path, source) {
            debug!(path = %path.display(), "Excluded");
            result.skipped += 1;
            if file_type.is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let target = match path.strip_prefix(source) {
            Ok(relative) if relative.as_os_str().is_empty() => dest.to_path_buf(),
            Ok(relative) => dest.join(relative),
            Err(_) => continue,
        };

        if file_type.is_dir() {
            let is_subtree_root = target == dest;
            if let Err(e) = tree.add_dir(path, target) {
                if is_subtree_root || tree.is_destination_lost(&e) {
                    return Err(tree.lost(e));
                }
                warn!(path = %path.display(), error = %e, "Cannot create directory");
                result.errors.push(EntryError::new(path, e));
            }
            continue;
        }

        // Symlinks to files are copied as files; links to directories and
        // dangling links are skipped along with sockets, FIFOs and devices.
        if !(file_type.is_file() || (file_type.is_symlink() && path.is_file())) {
            debug!(path = %path.display(), "Skipping non-regular entry");
            result.skipped += 1;
            continue;
        }

        match copy_file(path, &target, dest, tree) {
            Ok(bytes) => {
                for (dir, e) in tree.materialize() {
                    if tree.is_destination_lost(&e) {
                        return Err(tree.lost(e));
                    }
                    warn!(path = %dir.display(), error = %e, "Cannot create directory");
                    result.errors.push(EntryError::new(&dir, e));
                }

                result.files_copied += 1;
                result.bytes_copied += bytes;
                debug!(path = %path.display(), bytes, "Copied");
                on_progress(path, result.bytes_copied);
            }
            Err(WriteError::Lost(e)) => return Err(tree.lost(e)),
            Err(WriteError::Entry(e)) => {
                warn!(path = %path.display(), error = %e, "Failed to copy file");
                result.errors.push(EntryError::new(path, e));
            }
        }
    }

    Ok(result)
}

fn copy_file(
    source: &Path,
    target: &Path,
    subtree: &Path,
    tree: &DestTree,
) -> std::result::Result<u64, WriteError> {
    // Open the source before touching the destination so an unreadable file
    // never materializes the snapshot.
    let metadata = FileMetadata::from_path(source).map_err(WriteError::Entry)?;
    let mut reader = File::open(source).map_err(WriteError::Entry)?;

    let created = tree.prepare_file(target, subtree)?;
    write_file(&mut reader, target, &metadata).map_err(|e| {
        tree.discard(&created);
        tree.classify(e)
    })
}

/// Write `target` from `reader`. A partly written target is removed again.
fn write_file(reader: &mut File, target: &Path, metadata: &FileMetadata) -> io::Result<u64> {
    let mut writer = File::create(target)?;
    let copied = io::copy(reader, &mut writer);
    drop(writer);

    let result = copied.and_then(|bytes| metadata.apply_to_path(target).map(|()| bytes));
    if result.is_err() {
        if let Err(e) = fs::remove_file(target) {
            warn!(path = %target.display(), error = %e, "Cannot remove incomplete file");
        }
    }
    result
}
