//! Core domain types for the Pillbox system.
//!
//! - Medicines and their dosing state
//! - Dispense log entries and the records read back from the log sheet
//! - Display tiers for the countdown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Medicine
// ============================================================================

/// Pills loaded into a freshly filled dispenser box
pub const DEFAULT_PILLS_PER_BOX: u32 = 5;

/// A medicine on the active list
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: String,
    pub name: String,
    pub dose: String,
    pub times_per_day: u32,
    pub duration_days: u32,
    pub instructions: String,
    /// Earliest moment the next dose is due; may be in the past when overdue
    pub next_dose_time: DateTime<Utc>,
    /// When the last dose was dispensed; `None` until the first dispense
    #[serde(default)]
    pub last_dose_time: Option<DateTime<Utc>>,
    #[serde(default = "default_pills")]
    pub pills_remaining: u32,
}

fn default_pills() -> u32 {
    DEFAULT_PILLS_PER_BOX
}

/// Fields needed to put a new medicine on the list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMedicine {
    pub name: String,
    pub dose: String,
    pub times_per_day: u32,
    pub duration_days: u32,
    pub instructions: String,
}

impl Medicine {
    /// Create a medicine with no dosing history.
    ///
    /// A never-dosed medicine is due immediately, so `next_dose_time` is
    /// `now`. Rejects `times_per_day == 0`.
    pub fn create(fields: NewMedicine, pills: u32, now: DateTime<Utc>) -> crate::Result<Self> {
        let next_dose_time = crate::schedule::next_dose_time(fields.times_per_day, None, now)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: fields.name,
            dose: fields.dose,
            times_per_day: fields.times_per_day,
            duration_days: fields.duration_days,
            instructions: fields.instructions,
            next_dose_time,
            last_dose_time: None,
            pills_remaining: pills,
        })
    }
}

// ============================================================================
// Dispense log
// ============================================================================

/// One dispense, as shipped to the log sheet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub medicine_name: String,
    pub supposed_last_taken_time: DateTime<Utc>,
    pub actual_last_taken_time: DateTime<Utc>,
    pub is_miss: bool,
    pub is_early_dispense: bool,
}

impl LogEntry {
    /// Wire fields: SGT display timestamps and `"0"`/`"1"` flags
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("medicineName", self.medicine_name.clone()),
            (
                "supposedLastTakenTime",
                crate::sgt::format_sgt(self.supposed_last_taken_time),
            ),
            (
                "actualLastTakenTime",
                crate::sgt::format_sgt(self.actual_last_taken_time),
            ),
            ("isMiss", flag(self.is_miss).to_string()),
            ("isEarlyDispense", flag(self.is_early_dispense).to_string()),
        ]
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// A validated row read back from the log sheet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdherenceRecord {
    pub row_number: u64,
    pub entry: LogEntry,
}

// ============================================================================
// Countdown display
// ============================================================================

/// Colour band for the time-remaining bar
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTier {
    Green,
    Amber,
    Red,
}

/// Snapshot of one medicine's countdown at a given instant
#[derive(Clone, Debug, PartialEq)]
pub struct DoseStatus {
    pub remaining: chrono::Duration,
    pub progress: f64,
    pub tier: ProgressTier,
    pub due: bool,
}
