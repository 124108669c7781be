//! The active medicine list, persisted with file locking.
//!
//! The roster is a local cache of the reminder sheet plus the dosing state
//! (next dose, pills left) that only this machine knows about.

use crate::dispense::{dispense, DispensePolicy};
use crate::schedule::next_dose_time;
use crate::{Error, LogEntry, Medicine, NewMedicine, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Medicines currently being reminded about
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Roster {
    pub medicines: Vec<Medicine>,
}

/// What a reminder sync changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl Roster {
    /// Load the roster with a shared lock.
    ///
    /// A missing file is an empty roster. Unlike a missing file, a roster
    /// that fails to parse is an error: dosing state is not thrown away.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No roster file found, starting with an empty list");
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let roster: Roster = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded {} medicines from {:?}", roster.medicines.len(), path);
        Ok(roster)
    }

    /// Save the roster atomically.
    ///
    /// Writes to a locked temp file in the same directory, syncs it and
    /// renames it over the original.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Other(format!("roster path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved roster to {:?}", path);
        Ok(())
    }

    /// Load, modify and save in one step.
    ///
    /// Holds an exclusive lock on `<roster>.lock` for the whole cycle so
    /// concurrent dispenses from separate processes serialize.
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut Roster) -> Result<T>,
    {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let guard = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(path))?;
        guard.lock_exclusive()?;

        let result = Self::load(path).and_then(|mut roster| {
            let out = f(&mut roster)?;
            roster.save(path)?;
            Ok(out)
        });

        guard.unlock()?;
        result
    }

    fn position(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.medicines
            .iter()
            .position(|m| m.name.trim().eq_ignore_ascii_case(wanted))
    }

    /// Look a medicine up by name, ignoring case and surrounding spaces
    pub fn find(&self, name: &str) -> Option<&Medicine> {
        self.position(name).map(|i| &self.medicines[i])
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Medicine> {
        match self.position(name) {
            Some(i) => Ok(&mut self.medicines[i]),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Put a new medicine on the list, due immediately
    pub fn add(&mut self, fields: NewMedicine, pills: u32, now: DateTime<Utc>) -> Result<&Medicine> {
        if self.position(&fields.name).is_some() {
            return Err(Error::Duplicate(fields.name));
        }
        let medicine = Medicine::create(fields, pills, now)?;
        tracing::info!("Added {} ({}x daily)", medicine.name, medicine.times_per_day);
        self.medicines.push(medicine);
        Ok(&self.medicines[self.medicines.len() - 1])
    }

    /// Take a medicine off the list
    pub fn remove(&mut self, name: &str) -> Result<Medicine> {
        let index = self
            .position(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let medicine = self.medicines.remove(index);
        tracing::info!("Removed {}", medicine.name);
        Ok(medicine)
    }

    /// Dispense one dose of the named medicine
    pub fn dispense(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
        policy: &DispensePolicy,
    ) -> Result<LogEntry> {
        dispense(self.find_mut(name)?, now, policy)
    }

    /// Reload the dispenser box for the named medicine
    pub fn refill(&mut self, name: &str, pills: u32) -> Result<u32> {
        let medicine = self.find_mut(name)?;
        medicine.pills_remaining = pills;
        Ok(pills)
    }

    /// Fold freshly fetched reminders into the roster.
    ///
    /// Medicines already present keep their dosing state. If the frequency
    /// changed and the medicine has been dispensed before, the next dose is
    /// re-derived from that last intake; a never-dosed medicine stays due.
    /// New names are added as due now. With `prune`, medicines missing from
    /// the fetched list are dropped.
    pub fn merge_reminders(
        &mut self,
        reminders: Vec<NewMedicine>,
        pills: u32,
        prune: bool,
        now: DateTime<Utc>,
    ) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();
        let mut seen = Vec::with_capacity(reminders.len());

        for fields in reminders {
            seen.push(fields.name.trim().to_ascii_lowercase());
            match self.position(&fields.name) {
                Some(i) => {
                    let medicine = &mut self.medicines[i];
                    if medicine.times_per_day != fields.times_per_day {
                        let rederived =
                            next_dose_time(fields.times_per_day, medicine.last_dose_time, now)?;
                        if medicine.last_dose_time.is_some() {
                            medicine.next_dose_time = rederived;
                        }
                    }
                    medicine.dose = fields.dose;
                    medicine.times_per_day = fields.times_per_day;
                    medicine.duration_days = fields.duration_days;
                    medicine.instructions = fields.instructions;
                    summary.updated += 1;
                }
                None => {
                    self.medicines.push(Medicine::create(fields, pills, now)?);
                    summary.added += 1;
                }
            }
        }

        if prune {
            let before = self.medicines.len();
            self.medicines
                .retain(|m| seen.contains(&m.name.trim().to_ascii_lowercase()));
            summary.removed = before - self.medicines.len();
        }

        tracing::info!(
            "Merged reminders: {} added, {} updated, {} removed",
            summary.added,
            summary.updated,
            summary.removed
        );
        Ok(summary)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
