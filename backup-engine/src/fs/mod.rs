//! Filesystem side of a backup: exclusion, metadata and tree copying.

pub mod copier;
pub mod exclude;
pub mod metadata;
