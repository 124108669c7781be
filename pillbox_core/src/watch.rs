//! The once-a-second tick that drives countdowns and the alarm.
//!
//! Each tick re-reads the roster (another process may have dispensed),
//! recomputes every countdown, converges the alarm and announces doses that
//! have just fallen due. Network work never runs on the tick: reminder
//! refreshes happen on a background thread and come back through a channel,
//! tagged with a generation ticket so a stale reply is discarded.

use crate::alarm::{due_medicines, Alarm, AlarmChange, AlarmSink};
use crate::generation::{Generation, Ticket};
use crate::outbox::Outbox;
use crate::records::Parsed;
use crate::roster::{MergeSummary, Roster};
use crate::service::CareService;
use crate::speech::{reminder_message, SpeechQueue};
use crate::{DoseStatus, NewMedicine, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Where the watcher keeps its files and how it merges reminders
#[derive(Clone, Debug)]
pub struct WatchOptions {
    pub roster_path: PathBuf,
    pub outbox_path: PathBuf,
    pub pills_per_box: u32,
    pub prune: bool,
}

/// Countdown line for one medicine
#[derive(Clone, Debug)]
pub struct StatusRow {
    pub name: String,
    pub pills_remaining: u32,
    pub status: Option<DoseStatus>,
}

/// Everything one tick observed
#[derive(Clone, Debug)]
pub struct TickReport {
    pub rows: Vec<StatusRow>,
    pub due: Vec<String>,
    pub alarm: AlarmChange,
    pub refreshed: Option<MergeSummary>,
}

struct Refresh {
    ticket: Ticket,
    result: Result<Parsed<NewMedicine>>,
}

pub struct Watch<S: AlarmSink> {
    options: WatchOptions,
    service: Arc<dyn CareService>,
    alarm: Alarm<S>,
    speech: Option<SpeechQueue>,
    generation: Generation,
    sender: Sender<Refresh>,
    receiver: Receiver<Refresh>,
    announced: HashSet<String>,
}

impl<S: AlarmSink> Watch<S> {
    pub fn new(
        options: WatchOptions,
        service: Arc<dyn CareService>,
        sink: S,
        speech: Option<SpeechQueue>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            options,
            service,
            alarm: Alarm::new(sink),
            speech,
            generation: Generation::new(),
            sender,
            receiver,
            announced: HashSet::new(),
        }
    }

    pub fn alarm(&self) -> &Alarm<S> {
        &self.alarm
    }

    /// Kick off a background refresh: retry the outbox, then fetch reminders.
    ///
    /// Any refresh still in flight is superseded.
    pub fn request_refresh(&self) -> Ticket {
        let ticket = self.generation.issue();
        let service = Arc::clone(&self.service);
        let sender = self.sender.clone();
        let outbox = Outbox::new(self.options.outbox_path.clone());

        std::thread::spawn(move || {
            if let Err(e) = outbox.flush(|entry| service.post_log(entry)) {
                tracing::warn!("Outbox flush failed: {}", e);
            }
            let result = service.fetch_reminders();
            // The watcher may be gone by now; nothing to do then.
            let _ = sender.send(Refresh { ticket, result });
        });

        tracing::debug!("Requested reminder refresh {:?}", ticket);
        ticket
    }

    /// Block up to `timeout` for a refresh to land, then apply it
    pub fn await_refresh(
        &mut self,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<MergeSummary>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(refresh) => self.accept(refresh, now),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn accept(&mut self, refresh: Refresh, now: DateTime<Utc>) -> Result<Option<MergeSummary>> {
        if !self.generation.is_current(refresh.ticket) {
            tracing::debug!("Discarding stale refresh {:?}", refresh.ticket);
            return Ok(None);
        }

        let parsed = match refresh.result {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Reminder refresh failed: {}", e);
                return Ok(None);
            }
        };

        let pills = self.options.pills_per_box;
        let prune = self.options.prune;
        let summary = Roster::update(&self.options.roster_path, |roster| {
            roster.merge_reminders(parsed.records, pills, prune, now)
        })?;
        Ok(Some(summary))
    }

    /// One tick at `now`
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut refreshed = None;
        while let Ok(refresh) = self.receiver.try_recv() {
            if let Some(summary) = self.accept(refresh, now)? {
                refreshed = Some(summary);
            }
        }

        let roster = Roster::load(&self.options.roster_path)?;

        let rows = roster
            .medicines
            .iter()
            .map(|m| StatusRow {
                name: m.name.clone(),
                pills_remaining: m.pills_remaining,
                status: m
                    .status(now)
                    .map_err(|e| tracing::warn!("{}: {}", m.name, e))
                    .ok(),
            })
            .collect();

        let due = due_medicines(&roster.medicines, now);
        let alarm = self.alarm.update(due.len());

        let due_ids: HashSet<String> = due.iter().map(|m| m.id.clone()).collect();
        self.announced.retain(|id| due_ids.contains(id));
        for medicine in &due {
            if self.announced.insert(medicine.id.clone()) {
                if let Some(speech) = &self.speech {
                    speech.speak(reminder_message(medicine));
                }
            }
        }

        Ok(TickReport {
            rows,
            due: due.iter().map(|m| m.name.clone()).collect(),
            alarm,
            refreshed,
        })
    }

    /// Stop, letting queued announcements finish
    pub fn finish(self) -> usize {
        self.speech.map(SpeechQueue::finish).unwrap_or(0)
    }
}
