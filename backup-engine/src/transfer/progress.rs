//! Progress rendering for backup runs.
//!
//! Turns the engine's cumulative [`ProgressEvent`]s into speed figures and
//! human-readable strings for a terminal front end.

use crate::executor::events::ProgressEvent;
use std::time::{Duration, Instant};

/// Minimum interval between rendered progress lines
const RENDER_INTERVAL: Duration = Duration::from_millis(250);

/// Speed-aware view of a running backup
pub struct ProgressTracker {
    start_time: Instant,
    last_update_time: Instant,
    last_render: Option<Instant>,
    last_bytes: u64,
    bytes_per_second: u64,
    files_copied: u64,
    bytes_copied: u64,
    current_file: Option<String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update_time: now,
            last_render: None,
            last_bytes: 0,
            bytes_per_second: 0,
            files_copied: 0,
            bytes_copied: 0,
            current_file: None,
        }
    }

    /// Fold in a progress event and recompute the instantaneous speed.
    pub fn update(&mut self, event: &ProgressEvent) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update_time).as_secs_f64();

        if elapsed > 0.0 {
            let bytes_diff = event.bytes_copied.saturating_sub(self.last_bytes);
            self.bytes_per_second = (bytes_diff as f64 / elapsed) as u64;
        }

        self.files_copied = event.files_copied;
        self.bytes_copied = event.bytes_copied;
        self.current_file = Some(event.current_path.display().to_string());
        self.last_update_time = now;
        self.last_bytes = event.bytes_copied;
    }

    /// True when enough time has passed since the last rendered line.
    pub fn should_render(&mut self) -> bool {
        let now = Instant::now();
        match self.last_render {
            Some(last) if now.duration_since(last) < RENDER_INTERVAL => false,
            _ => {
                self.last_render = Some(now);
                true
            }
        }
    }

    /// One-line status, e.g. `42 files, 1.50 MB (3.00 MB/s) /photos/a.jpg`
    pub fn render(&self) -> String {
        format!(
            "{} files, {} ({}) {}",
            self.files_copied,
            format_bytes(self.bytes_copied),
            format_speed(self.bytes_per_second),
            self.current_file.as_deref().unwrap_or("")
        )
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.bytes_copied as f64 / elapsed) as u64
        } else {
            0
        }
    }

    pub fn files_copied(&self) -> u64 {
        self.files_copied
    }

    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
