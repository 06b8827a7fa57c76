//! Backup Engine Library
//!
//! Copies a profile's source directories into timestamped snapshot
//! directories, reports progress over a channel, supports cooperative
//! cancellation and keeps only the newest snapshots per prefix.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod schedule;
pub mod snapshot;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::events::{BackupEvent, CompletionEvent, Outcome, ProgressEvent};
pub use executor::{BackupJob, BackupJobConfig, RunState, RunStatus};
pub use schedule::{is_due, Frequency};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
