//! Backup Engine - command-line front end
//!
//! Runs, lists and prunes snapshot backups for the profiles in a config file.

use anyhow::{bail, Result};
use backup_engine::config::{BackupState, Config, Profile};
use backup_engine::daemon::interrupt::cancel_on_interrupt;
use backup_engine::schedule::{is_due, next_due_date};
use backup_engine::snapshot::{self, RetentionReport};
use backup_engine::transfer::progress::{format_bytes, format_duration, ProgressTracker};
use backup_engine::{utils, BackupEvent, BackupJob, CompletionEvent, Outcome};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up a profile now
    Run {
        profile: String,

        /// Print events as JSON lines instead of a progress display
        #[arg(long)]
        json: bool,

        /// Only run when the profile's frequency says a backup is due
        #[arg(long)]
        if_due: bool,
    },

    /// Show which profiles are due for a backup
    Due {
        /// Evaluate as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// List a profile's snapshots, oldest first
    List { profile: String },

    /// Delete a profile's oldest snapshots beyond its limit
    Prune { profile: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("backup-engine v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run {
            profile,
            json,
            if_due,
        } => run(&config, &profile, json, if_due).await,
        Command::Due { today } => due(&config, today.unwrap_or_else(|| Local::now().date_naive())),
        Command::List { profile } => list(config.profile(&profile)?),
        Command::Prune { profile } => {
            let profile = config.profile(&profile)?;
            let report = snapshot::enforce(
                &profile.destination_root,
                profile.prefix(),
                profile.max_snapshots,
            );
            print_retention(&report);
            Ok(())
        }
    }
}

async fn run(config: &Config, name: &str, json: bool, if_due: bool) -> Result<()> {
    let profile = config.profile(name)?;
    let state_path = config.state_path();
    let mut state = BackupState::load(&state_path)?;
    let today = Local::now().date_naive();

    if if_due && !is_due(state.last_backup(name), profile.frequency, today) {
        println!("{name}: not due");
        return Ok(());
    }

    let job = BackupJob::new();
    let (tx, mut rx) = mpsc::channel(config.engine.event_buffer);
    let handle = job.start(profile.job_config()?, tx)?;
    let interrupt = cancel_on_interrupt(job.clone());

    let mut tracker = ProgressTracker::new();
    let mut completion = None;

    while let Some(event) = rx.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }
        match event {
            BackupEvent::Progress(progress) => {
                tracker.update(&progress);
                if !json && tracker.should_render() {
                    println!("{}", tracker.render());
                }
            }
            BackupEvent::Completed(done) => completion = Some(done),
        }
    }

    interrupt.abort();
    let completion = match completion {
        Some(completion) => completion,
        None => handle.await?,
    };
    job.acknowledge();

    if !json {
        print_summary(&completion);
    }

    match completion.outcome {
        Outcome::Completed => {
            state.record_backup(name, today);
            state.save(&state_path)?;
            Ok(())
        }
        Outcome::Cancelled => Ok(()),
        Outcome::Failed => bail!(
            "backup of {name} failed: {}",
            completion.fatal_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn due(config: &Config, today: NaiveDate) -> Result<()> {
    let state = BackupState::load(&config.state_path())?;

    for profile in &config.profiles {
        let last = state.last_backup(&profile.name);
        let next = next_due_date(last, profile.frequency, today)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "never".to_string());
        let status = if is_due(last, profile.frequency, today) {
            "DUE"
        } else {
            "ok"
        };
        let last = last
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<20} {:<4} frequency={} last={} next={}",
            profile.name, status, profile.frequency, last, next
        );
    }

    Ok(())
}

fn list(profile: &Profile) -> Result<()> {
    let snapshots = snapshot::list_snapshots(&profile.destination_root, profile.prefix())?;
    if snapshots.is_empty() {
        println!("No snapshots for {} in {}", profile.name, profile.destination_root.display());
    }
    for snapshot in snapshots {
        let created = snapshot
            .created_at
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("{:<40} {}", snapshot.name, created);
    }
    Ok(())
}

fn print_summary(completion: &CompletionEvent) {
    let outcome = match completion.outcome {
        Outcome::Completed => "completed",
        Outcome::Cancelled => "cancelled",
        Outcome::Failed => "FAILED",
    };

    println!(
        "Backup {outcome}: {} files, {}, {} skipped, {} errors in {}",
        completion.files_copied,
        format_bytes(completion.bytes_copied),
        completion.skipped,
        completion.errors.len(),
        format_duration(completion.duration_secs)
    );
    if let Some(snapshot) = &completion.snapshot {
        println!("Snapshot: {}", snapshot.display());
    }
    for error in &completion.errors {
        println!("  error: {error}");
    }
    if let Some(fatal) = &completion.fatal_error {
        println!("  fatal: {fatal}");
    }
    if let Some(report) = &completion.retention {
        print_retention(report);
    }
}

fn print_retention(report: &RetentionReport) {
    for deleted in &report.deleted {
        println!("Deleted old snapshot {}", deleted.display());
    }
    for error in &report.errors {
        println!("  retention error: {error}");
    }
    println!("{} snapshots kept", report.kept);
}
