//! Backup job executor - orchestrates one snapshot run.
//!
//! A [`BackupJob`] owns the run state machine:
//!
//! ```text
//! Idle -> Running -> { Completed | Cancelled | Failed } -> (acknowledge) -> Idle
//! ```
//!
//! The copy runs on a blocking worker thread. Progress and the single
//! completion event are delivered on a channel owned by the caller.
//! Retention only runs after a fully completed copy.

pub mod events;

use crate::fs::copier::{copy_tree, DestTree, EntryError};
use crate::fs::exclude::ExclusionMatcher;
use crate::snapshot::naming::MAX_SUFFIX_LEN;
use crate::snapshot::{self, SnapshotNamer};
use crate::utils::errors::{EngineError, Result};
use events::{BackupEvent, CompletionEvent, Outcome, ProgressEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Longest single path component most filesystems accept, in bytes.
const MAX_NAME_LEN: usize = 255;

/// Immutable input to a backup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupJobConfig {
    /// Directory under which snapshots are created
    pub destination_root: PathBuf,

    /// Names (and later recognizes) this job's snapshots
    pub snapshot_prefix: String,

    /// Absolute source directories, copied in order
    pub source_dirs: Vec<PathBuf>,

    /// Excluded paths; a directory takes its whole subtree with it
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Snapshots kept for this prefix after a successful run
    pub max_snapshots: usize,
}

impl BackupJobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_prefix.is_empty() {
            return Err(EngineError::Config("snapshot prefix must not be empty".into()));
        }
        if self.snapshot_prefix.contains(['/', '\\']) {
            return Err(EngineError::Config(format!(
                "snapshot prefix {:?} must not contain path separators",
                self.snapshot_prefix
            )));
        }
        if self.snapshot_prefix.len() + MAX_SUFFIX_LEN > MAX_NAME_LEN {
            return Err(EngineError::Config(format!(
                "snapshot prefix is {} bytes, at most {} fit in a directory name",
                self.snapshot_prefix.len(),
                MAX_NAME_LEN - MAX_SUFFIX_LEN
            )));
        }
        if self.max_snapshots == 0 {
            return Err(EngineError::Config("max_snapshots must be at least 1".into()));
        }
        if self.source_dirs.is_empty() {
            return Err(EngineError::Config("no source directories configured".into()));
        }
        if let Some(relative) = self.source_dirs.iter().find(|p| !p.is_absolute()) {
            return Err(EngineError::Config(format!(
                "source directory {} is not absolute",
                relative.display()
            )));
        }
        Ok(())
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Failed)
    }
}

impl From<Outcome> for RunState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => RunState::Completed,
            Outcome::Cancelled => RunState::Cancelled,
            Outcome::Failed => RunState::Failed,
        }
    }
}

/// Live view of the current (or last) run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub snapshot: Option<PathBuf>,
    pub current_path: Option<PathBuf>,
    pub copied_count: u64,
    pub skipped_count: u64,
    pub error_count: u64,
}

#[derive(Default)]
struct Inner {
    status: RunStatus,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_progress(&self, event: &ProgressEvent) {
        let mut inner = self.lock();
        inner.status.current_path = Some(event.current_path.clone());
        inner.status.copied_count = event.files_copied;
    }

    fn record_source_done(&self, skipped: u64, errors: u64) {
        let mut inner = self.lock();
        inner.status.skipped_count += skipped;
        inner.status.error_count += errors;
    }

    fn set_snapshot(&self, path: PathBuf) {
        self.lock().status.snapshot = Some(path);
    }

    fn finish(&self, completion: &CompletionEvent) {
        let mut inner = self.lock();
        inner.status.state = completion.outcome.into();
        inner.status.copied_count = completion.files_copied;
        inner.status.skipped_count = completion.skipped;
        inner.status.error_count = completion.errors.len() as u64;
        if completion.snapshot.is_none() {
            inner.status.snapshot = None;
        }
    }
}

/// Runs snapshot backups, one at a time.
///
/// Cloning yields another handle to the same job.
#[derive(Clone, Default)]
pub struct BackupJob {
    shared: Arc<Shared>,
    namer: SnapshotNamer,
}

impl BackupJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom snapshot namer (e.g. a fixed clock)
    pub fn with_namer(namer: SnapshotNamer) -> Self {
        Self {
            shared: Arc::default(),
            namer,
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().status.state
    }

    pub fn status(&self) -> RunStatus {
        self.shared.lock().status.clone()
    }

    /// Start a run in the background.
    ///
    /// Fails without touching any state if a run is in progress, or if the
    /// previous run's terminal state has not been acknowledged. The returned
    /// handle resolves to the same completion that is sent on `events`.
    pub fn start(
        &self,
        config: BackupJobConfig,
        events: mpsc::Sender<BackupEvent>,
    ) -> Result<JoinHandle<CompletionEvent>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let cancel = {
            let mut inner = self.shared.lock();
            match inner.status.state {
                RunState::Running => return Err(EngineError::AlreadyRunning),
                state if state.is_terminal() => {
                    return Err(EngineError::AwaitingAcknowledgement(state))
                }
                _ => {}
            }
            config.validate()?;

            inner.cancel = CancellationToken::new();
            inner.status = RunStatus {
                state: RunState::Running,
                ..RunStatus::default()
            };
            inner.cancel.clone()
        };

        let shared = Arc::clone(&self.shared);
        let namer = self.namer.clone();

        Ok(runtime.spawn(async move {
            let worker_shared = Arc::clone(&shared);
            let worker_events = events.clone();
            let worker = tokio::task::spawn_blocking(move || {
                run_backup(&config, &namer, &worker_shared, &cancel, &worker_events)
            });

            let completion = match worker.await {
                Ok(completion) => completion,
                Err(e) => {
                    error!(error = %e, "Backup worker panicked");
                    CompletionEvent::failed(format!("backup worker panicked: {e}"))
                }
            };

            shared.finish(&completion);
            if events.send(BackupEvent::Completed(completion.clone())).await.is_err() {
                warn!("Completion event dropped: receiver closed");
            }
            completion
        }))
    }

    /// Request cooperative cancellation. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let inner = self.shared.lock();
        if inner.status.state == RunState::Running {
            info!("Backup cancellation requested");
            inner.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Reset a terminal state to `Idle`, returning the state that was cleared.
    pub fn acknowledge(&self) -> Option<RunState> {
        let mut inner = self.shared.lock();
        let state = inner.status.state;
        if state.is_terminal() {
            inner.status = RunStatus::default();
            Some(state)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct RunTotals {
    files: u64,
    bytes: u64,
    skipped: u64,
    errors: Vec<EntryError>,
}

impl RunTotals {
    fn into_completion(
        self,
        outcome: Outcome,
        snapshot: Option<PathBuf>,
        started: Instant,
    ) -> CompletionEvent {
        CompletionEvent {
            outcome,
            snapshot,
            files_copied: self.files,
            bytes_copied: self.bytes,
            skipped: self.skipped,
            errors: self.errors.iter().map(ToString::to_string).collect(),
            fatal_error: None,
            retention: None,
            duration_secs: started.elapsed().as_secs(),
        }
    }
}

/// Body of the blocking worker: copy every source, then apply retention.
fn run_backup(
    config: &BackupJobConfig,
    namer: &SnapshotNamer,
    shared: &Shared,
    cancel: &CancellationToken,
    events: &mpsc::Sender<BackupEvent>,
) -> CompletionEvent {
    let started = Instant::now();
    let root = &config.destination_root;

    info!(
        prefix = %config.snapshot_prefix,
        root = %root.display(),
        sources = config.source_dirs.len(),
        "Backup started"
    );

    if let Err(e) = fs::create_dir_all(root) {
        let err = EngineError::DestinationUnavailable {
            path: root.clone(),
            source: e,
        };
        error!(error = %err, "Backup failed");
        return CompletionEvent::failed(err.to_string());
    }

    let name = match namer.new_snapshot_name(root, &config.snapshot_prefix) {
        Ok(name) => name,
        Err(e) => {
            error!(error = %e, "Backup failed");
            return CompletionEvent::failed(e.to_string());
        }
    };
    let snapshot_path = root.join(&name);
    shared.set_snapshot(snapshot_path.clone());

    let matcher = ExclusionMatcher::new(&config.exclude_patterns);
    let mut tree = DestTree::new(root);
    let mut used_names = HashSet::new();
    let mut totals = RunTotals::default();
    let mut cancelled = false;

    for source in &config.source_dirs {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let subtree = snapshot_path.join(subtree_name(source, &mut used_names));
        let (base_files, base_bytes) = (totals.files, totals.bytes);
        let mut files_in_source = 0u64;

        info!(source = %source.display(), target = %subtree.display(), "Copying source");

        let copied = copy_tree(
            source,
            &subtree,
            &matcher,
            &mut tree,
            |path, bytes| {
                files_in_source += 1;
                let event = ProgressEvent {
                    current_path: path.to_path_buf(),
                    files_copied: base_files + files_in_source,
                    bytes_copied: base_bytes + bytes,
                };
                shared.record_progress(&event);
                // A closed receiver only means nobody is watching.
                let _ = events.blocking_send(BackupEvent::Progress(event));
            },
            || cancel.is_cancelled(),
        );

        match copied {
            Ok(result) => {
                shared.record_source_done(result.skipped, result.errors.len() as u64);
                totals.files += result.files_copied;
                totals.bytes += result.bytes_copied;
                totals.skipped += result.skipped;
                totals.errors.extend(result.errors);
                if result.cancelled {
                    cancelled = true;
                    break;
                }
            }
            Err(e) => {
                error!(source = %source.display(), error = %e, "Backup failed");
                let snapshot = tree.is_materialized().then_some(snapshot_path);
                let mut completion = totals.into_completion(Outcome::Failed, snapshot, started);
                completion.fatal_error = Some(e.to_string());
                return completion;
            }
        }
    }

    let snapshot = tree.is_materialized().then(|| snapshot_path.clone());

    if cancelled {
        info!(
            snapshot = %name,
            files = totals.files,
            "Backup cancelled, partial snapshot left in place"
        );
        return totals.into_completion(Outcome::Cancelled, snapshot, started);
    }

    let retention = snapshot::enforce(root, &config.snapshot_prefix, config.max_snapshots);

    info!(
        snapshot = %name,
        files = totals.files,
        bytes = totals.bytes,
        skipped = totals.skipped,
        errors = totals.errors.len(),
        evicted = retention.deleted.len(),
        "Backup completed"
    );

    let mut completion = totals.into_completion(Outcome::Completed, snapshot, started);
    completion.retention = Some(retention);
    completion
}

/// Directory name for a source inside the snapshot: its leaf name, made
/// unique among the sources of this run with `_2`, `_3`, ...
fn subtree_name(source: &Path, used: &mut HashSet<String>) -> String {
    let leaf = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root_label(source));

    let mut candidate = leaf.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{leaf}_{n}");
        n += 1;
    }
    candidate
}

/// Stand-in leaf name for filesystem roots such as `/` or `C:\`.
fn root_label(source: &Path) -> String {
    let label: String = source
        .components()
        .filter_map(|c| match c {
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<String>()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    if label.is_empty() {
        "root".to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn config(root: &Path, sources: Vec<PathBuf>) -> BackupJobConfig {
        BackupJobConfig {
            destination_root: root.to_path_buf(),
            snapshot_prefix: "B_".to_string(),
            source_dirs: sources,
            exclude_patterns: Vec::new(),
            max_snapshots: 2,
        }
    }

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    fn many_files(dir: &Path, count: usize) -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        for i in 0..count {
            fs::write(dir.join(format!("img{i:04}.jpg")), b"pixels")?;
        }
        Ok(())
    }

    async fn drain(rx: &mut mpsc::Receiver<BackupEvent>) -> (Vec<ProgressEvent>, CompletionEvent) {
        let mut progress = Vec::new();
        let mut completion = None;
        while let Some(event) = rx.recv().await {
            match event {
                BackupEvent::Progress(p) => {
                    assert!(completion.is_none(), "progress after completion");
                    progress.push(p);
                }
                BackupEvent::Completed(c) => {
                    assert!(completion.is_none(), "second completion event");
                    completion = Some(c);
                }
            }
        }
        (progress, completion.expect("completion event"))
    }

    fn snapshot_names(root: &Path) -> Vec<String> {
        snapshot::list_snapshots(root, "B_")
            .expect("list")
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    #[test]
    fn test_config_validation() {
        let base = config(Path::new("/backups"), vec![PathBuf::from("/photos")]);
        assert!(base.validate().is_ok());

        let mut c = base.clone();
        c.max_snapshots = 0;
        assert!(matches!(c.validate(), Err(EngineError::Config(_))));

        let mut c = base.clone();
        c.snapshot_prefix = "a/b".into();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.snapshot_prefix = "B".repeat(250);
        assert!(matches!(c.validate(), Err(EngineError::Config(_))));
        c.snapshot_prefix = "B".repeat(MAX_NAME_LEN - MAX_SUFFIX_LEN);
        assert!(c.validate().is_ok());

        let mut c = base.clone();
        c.source_dirs = vec![PathBuf::from("relative/photos")];
        assert!(c.validate().is_err());

        let mut c = base;
        c.source_dirs.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_subtree_names_are_unique() {
        let mut used = HashSet::new();
        assert_eq!(subtree_name(Path::new("/a/photos"), &mut used), "photos");
        assert_eq!(subtree_name(Path::new("/b/photos"), &mut used), "photos_2");
        assert_eq!(subtree_name(Path::new("/c/photos"), &mut used), "photos_3");
        assert_eq!(subtree_name(Path::new("/"), &mut used), "root");
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (tx, _rx) = mpsc::channel(4);
        let job = BackupJob::new();
        let err = job
            .start(config(Path::new("/tmp/x"), vec![PathBuf::from("/tmp/y")]), tx)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoRuntime));
        assert_eq!(job.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_successful_run() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let photos = temp.path().join("photos");
        fs::create_dir_all(photos.join("album1"))?;
        fs::create_dir_all(photos.join("tmp"))?;
        fs::write(photos.join("album1/img.jpg"), b"jpeg-bytes")?;
        fs::write(photos.join("tmp/cache.bin"), b"cache")?;
        let root = temp.path().join("backups");

        let mut cfg = config(&root, vec![photos.clone()]);
        cfg.exclude_patterns = vec![photos.join("tmp").to_string_lossy().into_owned()];

        let job = BackupJob::with_namer(SnapshotNamer::with_clock(|| day(1)));
        let (tx, mut rx) = mpsc::channel(16);
        let handle = job.start(cfg, tx).expect("start");

        let (progress, completion) = drain(&mut rx).await;
        let joined = handle.await.expect("join");

        assert_eq!(completion.outcome, Outcome::Completed);
        assert_eq!(joined.outcome, Outcome::Completed);
        assert_eq!(completion.files_copied, 1);
        assert_eq!(completion.skipped, 1);
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].current_path, photos.join("album1/img.jpg"));
        assert!(completion.retention.is_some());

        let snapshot = root.join("B_20240101_000000");
        assert_eq!(completion.snapshot.as_deref(), Some(snapshot.as_path()));
        assert_eq!(fs::read(snapshot.join("photos/album1/img.jpg"))?, b"jpeg-bytes");
        assert!(!snapshot.join("photos/tmp").exists());

        assert_eq!(job.state(), RunState::Completed);
        assert_eq!(job.acknowledge(), Some(RunState::Completed));
        assert_eq!(job.state(), RunState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_retention_after_three_runs() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let photos = temp.path().join("photos");
        fs::create_dir_all(photos.join("album1"))?;
        fs::write(photos.join("album1/img.jpg"), b"jpeg-bytes")?;
        let root = temp.path().join("backups");

        let calls = Arc::new(AtomicUsize::new(0));
        let clock_calls = Arc::clone(&calls);
        let job = BackupJob::with_namer(SnapshotNamer::with_clock(move || {
            day(clock_calls.fetch_add(1, Ordering::SeqCst) as u32 + 1)
        }));

        for _ in 0..3 {
            let (tx, mut rx) = mpsc::channel(16);
            job.start(config(&root, vec![photos.clone()]), tx).expect("start");
            let (_, completion) = drain(&mut rx).await;
            assert_eq!(completion.outcome, Outcome::Completed);
            job.acknowledge();
        }

        assert_eq!(
            snapshot_names(&root),
            vec!["B_20240102_000000", "B_20240103_000000"]
        );
        for name in snapshot_names(&root) {
            assert_eq!(fs::read(root.join(name).join("photos/album1/img.jpg"))?, b"jpeg-bytes");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_running() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let photos = temp.path().join("photos");
        many_files(&photos, 200)?;
        let root = temp.path().join("backups");

        let job = BackupJob::new();
        // Capacity 1 and nobody reading: the worker stalls after a couple of files.
        let (tx, mut rx) = mpsc::channel(1);
        job.start(config(&root, vec![photos.clone()]), tx).expect("start");

        let (tx2, _rx2) = mpsc::channel(1);
        let err = job.start(config(&root, vec![photos.clone()]), tx2).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRunning));
        assert_eq!(job.state(), RunState::Running);

        assert!(job.cancel());
        let (_, completion) = drain(&mut rx).await;
        assert_eq!(completion.outcome, Outcome::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_retention() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let photos = temp.path().join("photos");
        many_files(&photos, 200)?;
        let root = temp.path().join("backups");
        for d in 1..=3 {
            fs::create_dir_all(root.join(format!("B_2023010{d}_000000")))?;
        }

        let job = BackupJob::with_namer(SnapshotNamer::with_clock(|| day(5)));
        let mut cfg = config(&root, vec![photos.clone()]);
        cfg.max_snapshots = 1;

        let (tx, mut rx) = mpsc::channel(1);
        job.start(cfg, tx).expect("start");

        let first = rx.recv().await.expect("first event");
        assert!(matches!(first, BackupEvent::Progress(_)));
        assert!(job.cancel());

        let (_, completion) = drain(&mut rx).await;
        assert!(completion.cancelled());
        assert!(completion.retention.is_none());
        assert!(completion.files_copied < 200);
        assert_eq!(job.state(), RunState::Cancelled);

        // Older snapshots survive; the partial one holds exactly what was copied.
        let partial = root.join("B_20240105_000000");
        assert_eq!(snapshot_names(&root).len(), 4);
        assert_eq!(
            fs::read_dir(partial.join("photos"))?.count() as u64,
            completion.files_copied
        );

        let (tx, _rx) = mpsc::channel(1);
        let err = job.start(config(&root, vec![photos]), tx).unwrap_err();
        assert!(matches!(err, EngineError::AwaitingAcknowledgement(RunState::Cancelled)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_destination_fails() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let photos = temp.path().join("photos");
        many_files(&photos, 3)?;
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"file in the way")?;

        let job = BackupJob::new();
        let (tx, mut rx) = mpsc::channel(8);
        job.start(config(&blocker.join("backups"), vec![photos]), tx)
            .expect("start");

        let (progress, completion) = drain(&mut rx).await;
        assert!(progress.is_empty());
        assert_eq!(completion.outcome, Outcome::Failed);
        assert!(completion.fatal_error.is_some());
        assert!(completion.retention.is_none());
        assert_eq!(job.state(), RunState::Failed);
        Ok(())
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_refused_snapshot_dir_fails_run() -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new()?;
        let photos = temp.path().join("photos");
        many_files(&photos, 3)?;
        let root = temp.path().join("backups");
        fs::create_dir_all(root.join("B_20231231_000000"))?;
        fs::set_permissions(&root, fs::Permissions::from_mode(0o555))?;

        // Privileged users ignore the mode bits; nothing to check then.
        if fs::create_dir(root.join("writable")).is_ok() {
            fs::remove_dir(root.join("writable"))?;
            fs::set_permissions(&root, fs::Permissions::from_mode(0o755))?;
            return Ok(());
        }

        let job = BackupJob::with_namer(SnapshotNamer::with_clock(|| day(1)));
        let (tx, mut rx) = mpsc::channel(8);
        let mut cfg = config(&root, vec![photos]);
        cfg.max_snapshots = 1;
        job.start(cfg, tx).expect("start");
        let (progress, completion) = drain(&mut rx).await;
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755))?;

        assert!(progress.is_empty());
        assert_eq!(completion.outcome, Outcome::Failed);
        assert!(completion.fatal_error.is_some());
        assert!(completion.snapshot.is_none());
        assert!(completion.retention.is_none());
        assert_eq!(snapshot_names(&root), vec!["B_20231231_000000"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let job = BackupJob::new();
        assert!(!job.cancel());
        assert_eq!(job.acknowledge(), None);
        assert_eq!(job.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_sources_with_same_leaf_do_not_collide() -> std::io::Result<()> {
        let temp = TempDir::new()?;
        let first = temp.path().join("a/photos");
        let second = temp.path().join("b/photos");
        fs::create_dir_all(&first)?;
        fs::create_dir_all(&second)?;
        fs::write(first.join("x.jpg"), b"first")?;
        fs::write(second.join("x.jpg"), b"second")?;
        let root = temp.path().join("backups");

        let job = BackupJob::with_namer(SnapshotNamer::with_clock(|| day(1)));
        let (tx, mut rx) = mpsc::channel(8);
        job.start(config(&root, vec![first, second]), tx).expect("start");
        let (progress, completion) = drain(&mut rx).await;

        assert_eq!(completion.files_copied, 2);
        assert_eq!(progress.last().map(|p| p.files_copied), Some(2));
        let snapshot = root.join("B_20240101_000000");
        assert_eq!(fs::read(snapshot.join("photos/x.jpg"))?, b"first");
        assert_eq!(fs::read(snapshot.join("photos_2/x.jpg"))?, b"second");
        Ok(())
    }
}
