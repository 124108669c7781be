//! Dose scheduling: next-dose time, countdown and progress bands.
//!
//! Every function takes `now` explicitly so the same inputs always give
//! the same answer; the tick loop supplies the clock.

use crate::{DoseStatus, Error, Medicine, ProgressTier, Result};
use chrono::{DateTime, Duration, Utc};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Progress above this stays green
pub const AMBER_AT_PERCENT: f64 = 60.0;
/// Progress at or below this turns red
pub const RED_AT_PERCENT: f64 = 30.0;

/// Nominal spacing between doses: `24 / times_per_day` hours.
///
/// Sub-millisecond remainders are truncated.
pub fn dose_interval(times_per_day: u32) -> Result<Duration> {
    if times_per_day == 0 {
        return Err(Error::Schedule(
            "times per day must be at least 1".to_string(),
        ));
    }
    Ok(Duration::milliseconds(DAY_MS / i64::from(times_per_day)))
}

/// When the next dose falls due.
///
/// Without a previous dose the medicine is due `now`.
pub fn next_dose_time(
    times_per_day: u32,
    last_dose_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let interval = dose_interval(times_per_day)?;
    Ok(match last_dose_time {
        Some(last) => last + interval,
        None => now,
    })
}

/// Time left until `next_dose_time`, floored at zero
pub fn remaining(next_dose_time: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next_dose_time - now).max(Duration::zero())
}

/// Remaining time as a share of the dose interval, clamped to `[0, 100]`
pub fn progress_percent(remaining: Duration, interval: Duration) -> f64 {
    let interval_ms = interval.num_milliseconds();
    if interval_ms <= 0 {
        return 0.0;
    }
    let pct = remaining.num_milliseconds() as f64 / interval_ms as f64 * 100.0;
    pct.clamp(0.0, 100.0)
}

/// Colour band for a progress percentage
pub fn tier(progress: f64) -> ProgressTier {
    if progress <= RED_AT_PERCENT {
        ProgressTier::Red
    } else if progress <= AMBER_AT_PERCENT {
        ProgressTier::Amber
    } else {
        ProgressTier::Green
    }
}

/// `HH:MM:SS` countdown text; hours are not wrapped at 24
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

impl Medicine {
    /// Time left until this medicine's next dose
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        remaining(self.next_dose_time, now)
    }

    /// Full countdown snapshot at `now`
    pub fn status(&self, now: DateTime<Utc>) -> Result<DoseStatus> {
        let interval = dose_interval(self.times_per_day)?;
        let remaining = self.remaining(now);
        let progress = progress_percent(remaining, interval);
        Ok(DoseStatus {
            remaining,
            progress,
            tier: tier(progress),
            due: remaining <= Duration::zero(),
        })
    }
}
