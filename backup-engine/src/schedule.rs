//! Backup due-date computation.
//!
//! Pure functions only: nothing here reads the clock or triggers a run. The
//! caller supplies `today` and decides what to do with the answer.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Dates in or before this year are treated as "never backed up".
const SENTINEL_YEAR: i32 = 1900;

/// How far back a missing last-backup date is placed.
const MISSING_DATE_MONTHS: u32 = 2;

/// How often a profile should be backed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Due on every check
    Always,
    Daily,
    #[default]
    Weekly,
    Monthly,
    /// Reminders disabled
    Never,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Frequency::Always => "always",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Never => "never",
        };
        f.write_str(name)
    }
}

/// The date from which a backup is due, or `None` for [`Frequency::Never`].
pub fn next_due_date(
    last_backup: Option<NaiveDate>,
    frequency: Frequency,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let last = effective_last_backup(last_backup, today);

    match frequency {
        Frequency::Always => today.checked_sub_days(Days::new(1)).or(Some(today)),
        Frequency::Daily => last.checked_add_days(Days::new(1)),
        Frequency::Weekly => last.checked_add_days(Days::new(7)),
        // Calendar months, clamped: Jan 31 + 1 month = Feb 28/29.
        Frequency::Monthly => last.checked_add_months(Months::new(1)),
        Frequency::Never => None,
    }
}

/// Whether a backup is due on `today`.
pub fn is_due(last_backup: Option<NaiveDate>, frequency: Frequency, today: NaiveDate) -> bool {
    next_due_date(last_backup, frequency, today).is_some_and(|due| today >= due)
}

fn effective_last_backup(last_backup: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    match last_backup {
        Some(date) if date.year() > SENTINEL_YEAR => date,
        _ => today
            .checked_sub_months(Months::new(MISSING_DATE_MONTHS))
            .unwrap_or(NaiveDate::MIN),
    }
}
