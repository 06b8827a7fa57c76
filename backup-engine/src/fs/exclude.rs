//! Exclusion matching for backup sources.
//!
//! Patterns are path prefixes. An entry is excluded when its path equals a
//! pattern or lies underneath it. Absolute patterns are compared against the
//! entry's absolute path; relative patterns against the entry's path relative
//! to the source directory being copied.

use std::path::{Component, Path, PathBuf};

/// Whether path comparison ignores case on this platform.
const FOLD_CASE: bool = cfg!(any(windows, target_os = "macos"));

/// Decides whether a filesystem entry is excluded from a backup run.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    patterns: Vec<PathBuf>,
}

impl ExclusionMatcher {
    /// Build a matcher from raw patterns.
    ///
    /// Blank patterns are dropped and surrounding whitespace is trimmed, so
    /// lists read from text files can be passed in as they are.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| {
                let trimmed = p.as_ref().trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(trimmed))
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check `path` (found while walking `source_root`) against every pattern.
    pub fn is_excluded(&self, path: &Path, source_root: &Path) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern.is_absolute() {
                starts_with(path, pattern)
            } else {
                path.strip_prefix(source_root)
                    .map(|relative| starts_with(relative, pattern))
                    .unwrap_or(false)
            }
        })
    }
}

/// Stateless form of [`ExclusionMatcher::is_excluded`] for absolute patterns.
pub fn is_excluded<S: AsRef<str>>(path: &Path, exclude_patterns: &[S]) -> bool {
    ExclusionMatcher::new(exclude_patterns).is_excluded(path, Path::new(""))
}

/// Component-wise prefix test, so `/photos/tmp` does not match `/photos/tmp2`.
fn starts_with(path: &Path, prefix: &Path) -> bool {
    let mut path_parts = normal_components(path);
    let mut prefix_parts = normal_components(prefix).peekable();

    if prefix_parts.peek().is_none() {
        return false;
    }

    for expected in prefix_parts {
        match path_parts.next() {
            Some(actual) if same_component(&actual, &expected) => {}
            _ => return false,
        }
    }

    true
}

fn normal_components(path: &Path) -> impl Iterator<Item = String> + '_ {
    path.components().filter_map(|c| match c {
        Component::CurDir => None,
        other => Some(other.as_os_str().to_string_lossy().into_owned()),
    })
}

fn same_component(a: &str, b: &str) -> bool {
    if FOLD_CASE {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}
