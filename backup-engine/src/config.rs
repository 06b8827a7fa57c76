//! Configuration management for the backup engine.
//!
//! Profiles are loaded from a TOML file. Each profile is turned into an
//! immutable [`BackupJobConfig`] right before a run. The last successful
//! backup date per profile lives in a separate JSON state file, written only
//! by the caller after a completed run.

use crate::executor::BackupJobConfig;
use crate::schedule::Frequency;
use crate::utils::errors::{EngineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory for persisted state (last backup dates)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Capacity of the bounded event channel between worker and caller
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// One photo-database profile and its backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,

    /// Directory holding this profile's snapshots
    pub destination_root: PathBuf,

    /// Defaults to `Backup_`, or `DBBackup_` for database-only profiles
    #[serde(default)]
    pub snapshot_prefix: Option<String>,

    #[serde(default)]
    pub source_dirs: Vec<PathBuf>,

    /// Newline-separated file with additional source directories
    #[serde(default)]
    pub source_list: Option<PathBuf>,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Newline-separated file with additional exclusions
    #[serde(default)]
    pub exclude_list: Option<PathBuf>,

    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    #[serde(default)]
    pub frequency: Frequency,

    /// Only the database and settings, not the photo folders
    #[serde(default)]
    pub database_only: bool,
}

// Default values
fn default_data_dir() -> PathBuf {
    PathBuf::from(".backup-engine")
}

fn default_event_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_snapshots() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate profile name {:?}",
                    profile.name
                )));
            }
        }
        if self.engine.event_buffer == 0 {
            return Err(EngineError::Config("event_buffer must be at least 1".into()));
        }
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| EngineError::Config(format!("unknown profile {name:?}")))
    }

    pub fn state_path(&self) -> PathBuf {
        self.engine.data_dir.join(STATE_FILE)
    }
}

impl Profile {
    pub fn prefix(&self) -> &str {
        match &self.snapshot_prefix {
            Some(prefix) => prefix.as_str(),
            None if self.database_only => "DBBackup_",
            None => "Backup_",
        }
    }

    /// Build the immutable run configuration, reading any list files now.
    pub fn job_config(&self) -> Result<BackupJobConfig> {
        let mut source_dirs = self.source_dirs.clone();
        if let Some(list) = &self.source_list {
            source_dirs.extend(read_path_list(list)?.into_iter().map(PathBuf::from));
        }

        let mut exclude_patterns = self.exclude_patterns.clone();
        if let Some(list) = &self.exclude_list {
            exclude_patterns.extend(read_path_list(list)?);
        }

        let config = BackupJobConfig {
            destination_root: self.destination_root.clone(),
            snapshot_prefix: self.prefix().to_string(),
            source_dirs,
            exclude_patterns,
            max_snapshots: self.max_snapshots,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Read a newline-separated list of paths, ignoring blank lines.
pub fn read_path_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        EngineError::Config(format!("cannot read path list {}: {}", path.display(), e))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Persisted per-profile backup history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupState {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileState {
    pub last_backup_date: Option<NaiveDate>,
}

impl BackupState {
    /// Load state, treating a missing file as empty history.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write state through a temporary file so a crash never truncates it.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn last_backup(&self, profile: &str) -> Option<NaiveDate> {
        self.profiles.get(profile).and_then(|p| p.last_backup_date)
    }

    pub fn record_backup(&mut self, profile: &str, date: NaiveDate) {
        self.profiles
            .entry(profile.to_string())
            .or_default()
            .last_backup_date = Some(date);
    }
}
