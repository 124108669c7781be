//! Adherence dashboard views over the log sheet.
//!
//! Pure shaping of [`AdherenceRecord`]s for the table, the per-medicine
//! timeline and the CSV export. Nothing here talks to the network.

use crate::sgt::{date_label, format_sgt, minutes_of_day};
use crate::{AdherenceRecord, Result};
use std::fs::File;
use std::path::Path;

const LABEL_WIDTH: usize = 20;

/// Sheet cells keep line breaks; labels are flattened and shortened
pub fn medicine_label(name: &str) -> String {
    let flat = name.split('\n').map(str::trim).collect::<Vec<_>>().join(" ");
    flat.chars().take(LABEL_WIDTH).collect()
}

/// Distinct medicine names in the order they first appear
pub fn unique_medicines(records: &[AdherenceRecord]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        if !names.contains(&record.entry.medicine_name) {
            names.push(record.entry.medicine_name.clone());
        }
    }
    names
}

/// Records for one medicine (exact sheet name), in sheet order
pub fn for_medicine<'a>(records: &'a [AdherenceRecord], name: &str) -> Vec<&'a AdherenceRecord> {
    records
        .iter()
        .filter(|r| r.entry.medicine_name == name)
        .collect()
}

/// Counts behind the dashboard header
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdherenceSummary {
    pub total: usize,
    pub missed: usize,
    pub early: usize,
    pub on_time: usize,
}

impl AdherenceSummary {
    /// Share of doses not missed, `None` when there are no doses
    pub fn adherence_percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.total - self.missed) as f64 / self.total as f64 * 100.0)
    }
}

pub fn summarize<'a, I>(records: I) -> AdherenceSummary
where
    I: IntoIterator<Item = &'a AdherenceRecord>,
{
    let mut summary = AdherenceSummary::default();
    for record in records {
        summary.total += 1;
        if record.entry.is_miss {
            summary.missed += 1;
        }
        if record.entry.is_early_dispense {
            summary.early += 1;
        }
        if !record.entry.is_miss && !record.entry.is_early_dispense {
            summary.on_time += 1;
        }
    }
    summary
}

/// One dose on a medicine's timeline
#[derive(Clone, Debug, PartialEq)]
pub struct TimelinePoint {
    pub day_index: usize,
    pub date: String,
    pub supposed_minutes: u32,
    /// `None` when the dose was missed
    pub actual_minutes: Option<u32>,
    pub diff_seconds: Option<i64>,
    pub missed: bool,
    pub supposed_label: String,
    pub actual_label: String,
}

/// Timeline for one medicine's records; missed doses have no actual time
pub fn timeline(records: &[&AdherenceRecord]) -> Vec<TimelinePoint> {
    records
        .iter()
        .enumerate()
        .map(|(day_index, record)| {
            let entry = &record.entry;
            let supposed = entry.supposed_last_taken_time;
            let actual = (!entry.is_miss).then_some(entry.actual_last_taken_time);

            TimelinePoint {
                day_index,
                date: date_label(supposed),
                supposed_minutes: minutes_of_day(supposed),
                actual_minutes: actual.map(minutes_of_day),
                diff_seconds: actual.map(|a| (a - supposed).num_seconds().abs()),
                missed: entry.is_miss,
                supposed_label: format_sgt(supposed),
                actual_label: actual
                    .map(format_sgt)
                    .unwrap_or_else(|| "Not Taken".to_string()),
            }
        })
        .collect()
}

/// A row in the CSV export; mirrors the log sheet columns
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    row_number: u64,
    #[serde(rename = "medicineName")]
    medicine_name: &'a str,
    #[serde(rename = "supposedLastTakenTime")]
    supposed: String,
    #[serde(rename = "actualLastTakenTime")]
    actual: String,
    #[serde(rename = "isMiss")]
    is_miss: u8,
    #[serde(rename = "isEarlyDispense")]
    is_early_dispense: u8,
}

impl<'a> From<&'a AdherenceRecord> for CsvRow<'a> {
    fn from(record: &'a AdherenceRecord) -> Self {
        CsvRow {
            row_number: record.row_number,
            medicine_name: &record.entry.medicine_name,
            supposed: format_sgt(record.entry.supposed_last_taken_time),
            actual: format_sgt(record.entry.actual_last_taken_time),
            is_miss: u8::from(record.entry.is_miss),
            is_early_dispense: u8::from(record.entry.is_early_dispense),
        }
    }
}

/// Write records to a CSV file, replacing it. Returns rows written.
pub fn export_csv<'a, I>(records: I, path: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a AdherenceRecord>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_writer(File::create(path)?);
    let mut count = 0;
    for record in records {
        writer.serialize(CsvRow::from(record))?;
        count += 1;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} log rows to {:?}", count, path);
    Ok(count)
}
