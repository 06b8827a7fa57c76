//! Progress presentation for backup runs.

pub mod progress;
