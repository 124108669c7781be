//! Outbox for dispense log entries that could not be posted.
//!
//! A dispense updates the local schedule immediately. If the log sheet is
//! unreachable the entry is appended here (JSON Lines, exclusive lock) and
//! retried later, oldest first, so the remote log converges on the local
//! history instead of silently diverging.

use crate::service::CareService;
use crate::{LogEntry, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Somewhere log entries can be appended
pub trait LogSink {
    fn append(&mut self, entry: &LogEntry) -> Result<()>;
}

/// JSONL-backed queue of unsent log entries
pub struct Outbox {
    path: PathBuf,
}

/// Outcome of handing a log entry over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// Outcome of retrying the outbox
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub remaining: usize,
}

impl Outbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Entries waiting to be sent, oldest first
    pub fn pending(&self) -> Result<Vec<LogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        file.lock_shared()?;
        let lines = read_lines(&file);
        file.unlock()?;
        Ok(entries(&lines?).cloned().collect())
    }

    /// Post queued entries in order through `send`.
    ///
    /// Stops at the first failure so ordering is preserved; whatever was not
    /// sent is written back under the same lock. Lines that cannot be read
    /// as entries are never sent and are written back verbatim.
    pub fn flush<F>(&self, mut send: F) -> Result<FlushReport>
    where
        F: FnMut(&LogEntry) -> Result<()>,
    {
        if !self.path.exists() {
            return Ok(FlushReport::default());
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.lock_exclusive()?;

        let lines = read_lines(&file)?;
        let total = entries(&lines).count();
        let mut sent = 0;
        for entry in entries(&lines) {
            match send(entry) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(
                        "Outbox retry for {} failed, keeping {} entries: {}",
                        entry.medicine_name,
                        total - sent,
                        e
                    );
                    break;
                }
            }
        }

        if sent > 0 {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            let mut writer = std::io::BufWriter::new(&file);
            let mut skipped = 0;
            for line in &lines {
                match line {
                    Line::Entry(_) if skipped < sent => skipped += 1,
                    Line::Entry(entry) => {
                        writer.write_all(serde_json::to_string(entry)?.as_bytes())?;
                        writer.write_all(b"\n")?;
                    }
                    Line::Unreadable(raw) => {
                        writer.write_all(raw.as_bytes())?;
                        writer.write_all(b"\n")?;
                    }
                }
            }
            writer.flush()?;
        }

        file.unlock()?;

        let report = FlushReport {
            sent,
            remaining: total - sent,
        };
        if report.sent > 0 {
            tracing::info!("Flushed {} queued log entries", report.sent);
        }
        Ok(report)
    }
}

impl LogSink for Outbox {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        tracing::debug!("Queued log entry for {}", entry.medicine_name);
        Ok(())
    }
}

/// Post `entry` to the log sheet, queueing it locally if that fails.
///
/// With no service the entry is queued straight away. If even the queue
/// cannot be written, the entry is logged in full before the error returns.
pub fn deliver<S: CareService + ?Sized>(
    service: Option<&S>,
    outbox: &mut Outbox,
    entry: &LogEntry,
) -> Result<Delivery> {
    if let Some(service) = service {
        match service.post_log(entry) {
            Ok(()) => return Ok(Delivery::Sent),
            Err(e) => tracing::warn!("Could not post log for {}: {}", entry.medicine_name, e),
        }
    }

    if let Err(e) = outbox.append(entry) {
        tracing::error!(
            entry = %serde_json::to_string(entry).unwrap_or_default(),
            "Could not queue log entry in {:?}: {}",
            outbox.path(),
            e
        );
        return Err(e);
    }
    Ok(Delivery::Queued)
}

enum Line {
    Entry(LogEntry),
    /// Kept on disk for inspection, never sent
    Unreadable(String),
}

fn entries(lines: &[Line]) -> impl Iterator<Item = &LogEntry> {
    lines.iter().filter_map(|line| match line {
        Line::Entry(entry) => Some(entry),
        Line::Unreadable(_) => None,
    })
}

fn read_lines(file: &File) -> Result<Vec<Line>> {
    let reader = BufReader::new(file);
    let mut lines = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogEntry>(&line) {
            Ok(entry) => lines.push(Line::Entry(entry)),
            Err(e) => {
                tracing::warn!("Skipping unreadable outbox line {}: {}", line_num + 1, e);
                lines.push(Line::Unreadable(line));
            }
        }
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(name: &str) -> LogEntry {
        let supposed = Utc.with_ymd_and_hms(2025, 8, 17, 0, 0, 0).unwrap();
        LogEntry {
            medicine_name: name.into(),
            supposed_last_taken_time: supposed,
            actual_last_taken_time: supposed + Duration::minutes(2),
            is_miss: false,
            is_early_dispense: false,
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut outbox = Outbox::new(temp_dir.path().join("outbox.jsonl"));

        outbox.append(&entry("A")).unwrap();
        outbox.append(&entry("B")).unwrap();

        let pending = outbox.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], entry("A"));
        assert_eq!(pending[1].medicine_name, "B");
    }

    #[test]
    fn test_flush_stops_at_first_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut outbox = Outbox::new(temp_dir.path().join("outbox.jsonl"));
        for name in ["A", "B", "C"] {
            outbox.append(&entry(name)).unwrap();
        }

        let mut posted = Vec::new();
        let report = outbox
            .flush(|e| {
                if e.medicine_name == "B" {
                    return Err(Error::Other("sheet offline".into()));
                }
                posted.push(e.medicine_name.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(report, FlushReport { sent: 1, remaining: 2 });
        assert_eq!(posted, vec!["A"]);
        let names: Vec<_> = outbox
            .pending()
            .unwrap()
            .into_iter()
            .map(|e| e.medicine_name)
            .collect();
        assert_eq!(names, vec!["B", "C"]);
    }

    #[test]
    fn test_flush_everything() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut outbox = Outbox::new(temp_dir.path().join("outbox.jsonl"));
        outbox.append(&entry("A")).unwrap();

        let report = outbox.flush(|_| Ok(())).unwrap();
        assert_eq!(report, FlushReport { sent: 1, remaining: 0 });
        assert!(outbox.pending().unwrap().is_empty());
    }

    #[test]
    fn test_flush_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let outbox = Outbox::new(temp_dir.path().join("none.jsonl"));
        assert_eq!(outbox.flush(|_| Ok(())).unwrap(), FlushReport::default());
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outbox.jsonl");
        let mut outbox = Outbox::new(&path);
        outbox.append(&entry("A")).unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{ not json\n");
        std::fs::write(&path, raw).unwrap();

        assert_eq!(outbox.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_flush_keeps_unreadable_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outbox.jsonl");
        let mut outbox = Outbox::new(&path);
        outbox.append(&entry("A")).unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{ not json\n");
        std::fs::write(&path, raw).unwrap();
        outbox.append(&entry("B")).unwrap();

        let report = outbox
            .flush(|e| match e.medicine_name.as_str() {
                "A" => Ok(()),
                _ => Err(Error::Other("sheet offline".into())),
            })
            .unwrap();
        assert_eq!(report, FlushReport { sent: 1, remaining: 1 });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{ not json");
        assert_eq!(outbox.pending().unwrap(), vec![entry("B")]);
    }
}
