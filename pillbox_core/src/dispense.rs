//! Dispense classification.
//!
//! A dispense is compared against the dose time it was supposed to cover:
//! - more than the miss threshold away (either side) counts as a miss
//! - any time before the supposed moment counts as early
//!
//! The next dose is then scheduled from the actual dispense moment, so a
//! late dose pushes the whole schedule back rather than catching up.

use crate::schedule::next_dose_time;
use crate::{Error, LogEntry, Medicine, Result};
use chrono::{DateTime, Duration, Utc};

/// Minutes either side of the supposed time before a dose counts as missed
pub const DEFAULT_MISS_THRESHOLD_MINUTES: i64 = 15;

/// Tunables for classifying a dispense
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispensePolicy {
    pub miss_threshold: Duration,
}

impl Default for DispensePolicy {
    fn default() -> Self {
        Self {
            miss_threshold: Duration::minutes(DEFAULT_MISS_THRESHOLD_MINUTES),
        }
    }
}

impl DispensePolicy {
    pub fn with_threshold_minutes(minutes: u32) -> Self {
        Self {
            miss_threshold: Duration::minutes(i64::from(minutes)),
        }
    }
}

/// Build the log entry for a dispense at `actual` against `supposed`
pub fn classify(
    medicine_name: &str,
    supposed: DateTime<Utc>,
    actual: DateTime<Utc>,
    policy: &DispensePolicy,
) -> LogEntry {
    let diff = (actual - supposed).abs();
    LogEntry {
        medicine_name: medicine_name.to_string(),
        supposed_last_taken_time: supposed,
        actual_last_taken_time: actual,
        is_miss: diff > policy.miss_threshold,
        is_early_dispense: actual < supposed,
    }
}

/// Dispense one pill of `medicine` at `now`.
///
/// Captures the supposed time before rescheduling, moves `next_dose_time`
/// to one interval after `now` and takes a pill out of the box. On error
/// the medicine is left untouched.
pub fn dispense(
    medicine: &mut Medicine,
    now: DateTime<Utc>,
    policy: &DispensePolicy,
) -> Result<LogEntry> {
    if medicine.pills_remaining == 0 {
        return Err(Error::EmptyBox(medicine.name.clone()));
    }

    let supposed = medicine.next_dose_time;
    let rescheduled = next_dose_time(medicine.times_per_day, Some(now), now)?;
    let entry = classify(&medicine.name, supposed, now, policy);

    medicine.next_dose_time = rescheduled;
    medicine.last_dose_time = Some(now);
    medicine.pills_remaining -= 1;

    tracing::info!(
        medicine = %medicine.name,
        miss = entry.is_miss,
        early = entry.is_early_dispense,
        pills_left = medicine.pills_remaining,
        "Dispensed dose"
    );
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn supposed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 17, 0, 0, 0).unwrap()
    }

    fn medicine() -> Medicine {
        Medicine {
            id: "m1".into(),
            name: "Lisinopril".into(),
            dose: "10mg".into(),
            times_per_day: 2,
            duration_days: 14,
            instructions: "morning and evening".into(),
            next_dose_time: supposed(),
            last_dose_time: None,
            pills_remaining: 5,
        }
    }

    #[test]
    fn test_on_time_dispense() {
        let entry = classify("x", supposed(), supposed(), &DispensePolicy::default());
        assert!(!entry.is_miss);
        assert!(!entry.is_early_dispense);
    }

    #[test]
    fn test_twenty_minutes_late_is_miss() {
        let actual = supposed() + Duration::minutes(20);
        let entry = classify("x", supposed(), actual, &DispensePolicy::default());
        assert!(entry.is_miss);
        assert!(!entry.is_early_dispense);
    }

    #[test]
    fn test_five_minutes_early_is_early_not_miss() {
        let actual = supposed() - Duration::minutes(5);
        let entry = classify("x", supposed(), actual, &DispensePolicy::default());
        assert!(!entry.is_miss);
        assert!(entry.is_early_dispense);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let policy = DispensePolicy::default();
        let at_edge = classify("x", supposed(), supposed() + Duration::minutes(15), &policy);
        assert!(!at_edge.is_miss);

        let past_edge = classify(
            "x",
            supposed(),
            supposed() + Duration::minutes(15) + Duration::milliseconds(1),
            &policy,
        );
        assert!(past_edge.is_miss);

        let very_early = classify("x", supposed(), supposed() - Duration::hours(2), &policy);
        assert!(very_early.is_miss);
        assert!(very_early.is_early_dispense);
    }

    #[test]
    fn test_custom_threshold() {
        let policy = DispensePolicy::with_threshold_minutes(30);
        let entry = classify("x", supposed(), supposed() + Duration::minutes(20), &policy);
        assert!(!entry.is_miss);
    }

    #[test]
    fn test_dispense_anchors_on_actual_time() {
        let mut med = medicine();
        let late = supposed() + Duration::minutes(40);

        let entry = dispense(&mut med, late, &DispensePolicy::default()).unwrap();

        assert_eq!(entry.supposed_last_taken_time, supposed());
        assert_eq!(entry.actual_last_taken_time, late);
        assert!(entry.is_miss);
        assert_eq!(med.next_dose_time, late + Duration::hours(12));
        assert_eq!(med.last_dose_time, Some(late));
        assert_eq!(med.pills_remaining, 4);
    }

    #[test]
    fn test_empty_box_leaves_medicine_untouched() {
        let mut med = medicine();
        med.pills_remaining = 0;
        let before = med.clone();

        let result = dispense(&mut med, supposed(), &DispensePolicy::default());

        assert!(matches!(result, Err(Error::EmptyBox(_))));
        assert_eq!(med, before);
    }

    #[test]
    fn test_bad_frequency_leaves_medicine_untouched() {
        let mut med = medicine();
        med.times_per_day = 0;
        let before = med.clone();

        assert!(dispense(&mut med, supposed(), &DispensePolicy::default()).is_err());
        assert_eq!(med, before);
    }
}
