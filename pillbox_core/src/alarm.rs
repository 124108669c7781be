//! Due-dose detection and the alarm that sounds while any dose is due.
//!
//! The alarm is level-triggered: each tick reports how many medicines are
//! due and the alarm converges to "playing" or "stopped" accordingly.

use crate::Medicine;
use chrono::{DateTime, Duration, Utc};

/// Where the alarm sound actually goes
pub trait AlarmSink {
    /// Start the looping alert
    fn play_loop(&mut self);
    /// Stop the alert and rewind it to the beginning
    fn stop_and_rewind(&mut self);
}

/// What a call to [`Alarm::update`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlarmChange {
    Started,
    Stopped,
    Unchanged,
}

/// Medicines whose next dose is due at `now`
pub fn due_medicines<'a>(medicines: &'a [Medicine], now: DateTime<Utc>) -> Vec<&'a Medicine> {
    medicines
        .iter()
        .filter(|m| m.remaining(now) <= Duration::zero())
        .collect()
}

/// Looping alarm driven by the due set
pub struct Alarm<S: AlarmSink> {
    sink: S,
    playing: bool,
}

impl<S: AlarmSink> Alarm<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Converge the alarm to the number of currently due medicines
    pub fn update(&mut self, due_count: usize) -> AlarmChange {
        match (due_count > 0, self.playing) {
            (true, false) => {
                self.sink.play_loop();
                self.playing = true;
                tracing::info!("{} dose(s) due, alarm on", due_count);
                AlarmChange::Started
            }
            (false, true) => {
                self.sink.stop_and_rewind();
                self.playing = false;
                tracing::info!("No doses due, alarm off");
                AlarmChange::Stopped
            }
            _ => AlarmChange::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Default)]
    struct CountingSink {
        plays: usize,
        stops: usize,
    }

    impl AlarmSink for CountingSink {
        fn play_loop(&mut self) {
            self.plays += 1;
        }

        fn stop_and_rewind(&mut self) {
            self.stops += 1;
        }
    }

    fn medicine(name: &str, next: DateTime<Utc>) -> Medicine {
        Medicine {
            id: name.into(),
            name: name.into(),
            dose: "1".into(),
            times_per_day: 1,
            duration_days: 1,
            instructions: String::new(),
            next_dose_time: next,
            last_dose_time: None,
            pills_remaining: 5,
        }
    }

    #[test]
    fn test_due_medicines_includes_exactly_due_and_overdue() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let meds = vec![
            medicine("exact", now),
            medicine("overdue", now - Duration::hours(1)),
            medicine("later", now + Duration::seconds(1)),
        ];

        let due: Vec<_> = due_medicines(&meds, now).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(due, vec!["exact", "overdue"]);
    }

    #[test]
    fn test_alarm_is_level_triggered() {
        let mut alarm = Alarm::new(CountingSink::default());

        assert_eq!(alarm.update(0), AlarmChange::Unchanged);
        assert_eq!(alarm.update(2), AlarmChange::Started);
        assert_eq!(alarm.update(1), AlarmChange::Unchanged);
        assert_eq!(alarm.update(3), AlarmChange::Unchanged);
        assert!(alarm.is_playing());
        assert_eq!(alarm.sink().plays, 1);

        assert_eq!(alarm.update(0), AlarmChange::Stopped);
        assert_eq!(alarm.update(0), AlarmChange::Unchanged);
        assert_eq!(alarm.sink().stops, 1);

        assert_eq!(alarm.update(1), AlarmChange::Started);
        assert_eq!(alarm.sink().plays, 2);
    }
}
