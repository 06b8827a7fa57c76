//! Snapshot directory names.
//!
//! Names are `<prefix><YYYYMMDD_HHMMSS>`, zero padded so that string order is
//! chronological order. When a name is already taken (two runs within the
//! same second) a `_NNN` counter is appended; `X` sorts before `X_001`, which
//! sorts before the next second's name.
//!
//! The local clock can step backwards (end of daylight saving time, NTP
//! corrections). A new name therefore never sorts before the newest existing
//! snapshot: if the clock is behind it, the newest snapshot's timestamp is
//! reused with the next counter. Retention relies on this ordering.

use crate::utils::errors::{EngineError, Result};
use chrono::{Local, NaiveDateTime, Timelike};
use std::path::Path;
use std::sync::Arc;

/// strftime format of the timestamp embedded in snapshot names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const TIMESTAMP_LEN: usize = 15;

const MAX_COLLISIONS: u32 = 999;

/// Longest possible name suffix after the prefix: timestamp plus `_NNN`.
pub(crate) const MAX_SUFFIX_LEN: usize = TIMESTAMP_LEN + 4;

/// Source of "now" for snapshot names.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Derives unique, sortable snapshot names from the local clock.
#[derive(Clone)]
pub struct SnapshotNamer {
    clock: Clock,
}

impl SnapshotNamer {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Use a fixed or scripted clock instead of the system clock.
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        Self {
            clock: Arc::new(clock),
        }
    }

    /// Name for a new snapshot under `destination_root`, unique at call time.
    pub fn new_snapshot_name(&self, destination_root: &Path, prefix: &str) -> Result<String> {
        name_at(destination_root, prefix, (self.clock)())
    }
}

impl Default for SnapshotNamer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotNamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotNamer").finish_non_exhaustive()
    }
}

/// `prefix` followed by the formatted timestamp, without collision handling.
pub fn format_name(prefix: &str, at: NaiveDateTime) -> String {
    format!("{}{}", prefix, at.format(TIMESTAMP_FORMAT))
}

/// First free name for `at` that sorts after every existing snapshot,
/// appending `_001`, `_002`, ... on collision.
pub fn name_at(destination_root: &Path, prefix: &str, at: NaiveDateTime) -> Result<String> {
    let at = at.with_nanosecond(0).unwrap_or(at);

    let (stamp, first_counter) = match newest_snapshot(destination_root, prefix)? {
        Some((newest, counter)) if newest >= at => (newest, counter.saturating_add(1)),
        _ => (at, 0),
    };

    let base = format_name(prefix, stamp);
    if first_counter == 0 && !is_taken(destination_root, &base) {
        return Ok(base);
    }

    (first_counter.max(1)..=MAX_COLLISIONS)
        .map(|n| format!("{base}_{n:03}"))
        .find(|candidate| !is_taken(destination_root, candidate))
        .ok_or_else(|| EngineError::Naming(format!("no free snapshot name for {base}")))
}

/// Timestamp and counter of the last snapshot in name order.
fn newest_snapshot(destination_root: &Path, prefix: &str) -> Result<Option<(NaiveDateTime, u32)>> {
    Ok(super::list_snapshots(destination_root, prefix)?
        .iter()
        .rev()
        .find_map(|snapshot| parse_name(&snapshot.name, prefix)))
}

/// Recover the timestamp embedded in a snapshot name.
pub(crate) fn parse_timestamp(name: &str, prefix: &str) -> Option<NaiveDateTime> {
    parse_name(name, prefix).map(|(stamp, _)| stamp)
}

/// Split a snapshot name into its timestamp and collision counter (0 if none).
fn parse_name(name: &str, prefix: &str) -> Option<(NaiveDateTime, u32)> {
    let rest = name.strip_prefix(prefix)?;
    let stamp = rest.get(..TIMESTAMP_LEN)?;
    let suffix = &rest[TIMESTAMP_LEN..];

    let counter = if suffix.is_empty() {
        0
    } else {
        let digits = suffix.strip_prefix('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()?
    };

    let stamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((stamp, counter))
}

fn is_taken(destination_root: &Path, name: &str) -> bool {
    destination_root.join(name).symlink_metadata().is_ok()
}
