//! Schemas for rows coming back from the sheet webhooks.
//!
//! The sheets have been edited by hand over time, so column names drift in
//! case and separators (`medicineName`, `MedicineName`, `medicine_name`).
//! Keys are normalised before lookup. Values are checked strictly: a row
//! that does not validate is rejected and reported, never coerced.

use crate::sgt::parse_sgt;
use crate::{AdherenceRecord, Error, LogEntry, NewMedicine, Result};
use serde_json::{Map, Value};

/// Rows that validated plus how many were thrown away
#[derive(Debug)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub rejected: Vec<Error>,
}

/// Validate every reminder row in a webhook response
pub fn parse_reminders(body: &Value) -> Result<Parsed<NewMedicine>> {
    parse_rows(body, reminder_from_row)
}

/// Validate every log row in a webhook response
pub fn parse_logs(body: &Value) -> Result<Parsed<AdherenceRecord>> {
    parse_rows(body, log_from_row)
}

fn parse_rows<T>(body: &Value, parse: fn(usize, &Value) -> Result<T>) -> Result<Parsed<T>> {
    let rows = body.as_array().ok_or_else(|| Error::MalformedRecord {
        row: 0,
        reason: "response is not a list of rows".to_string(),
    })?;

    let mut parsed = Parsed {
        records: Vec::with_capacity(rows.len()),
        rejected: Vec::new(),
    };

    for (i, row) in rows.iter().enumerate() {
        match parse(i + 1, row) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                tracing::warn!("Skipping row: {}", e);
                parsed.rejected.push(e);
            }
        }
    }

    tracing::debug!(
        "Validated {} rows, rejected {}",
        parsed.records.len(),
        parsed.rejected.len()
    );
    Ok(parsed)
}

/// One reminder row into the fields of a new medicine
pub fn reminder_from_row(row: usize, value: &Value) -> Result<NewMedicine> {
    let fields = Fields::new(row, value)?;

    let name = fields
        .string(&["medicinename", "name", "medicine"])?
        .ok_or_else(|| fields.malformed("missing medicineName"))?;
    if name.trim().is_empty() {
        return Err(fields.malformed("empty medicineName"));
    }

    let times_per_day = fields
        .integer(&["timesperday", "frequency"])?
        .ok_or_else(|| fields.malformed("missing timesPerDay"))?;
    if times_per_day == 0 {
        return Err(fields.malformed("timesPerDay must be at least 1"));
    }
    let times_per_day = u32::try_from(times_per_day)
        .map_err(|_| fields.malformed("timesPerDay out of range"))?;

    let duration_days = fields.integer(&["durationdays", "duration"])?.unwrap_or(0);
    let duration_days = u32::try_from(duration_days)
        .map_err(|_| fields.malformed("durationDays out of range"))?;

    Ok(NewMedicine {
        name: name.trim().to_string(),
        dose: fields.string(&["dose", "dosage"])?.unwrap_or_default(),
        times_per_day,
        duration_days,
        instructions: fields
            .string(&["instructions", "instruction"])?
            .unwrap_or_default(),
    })
}

/// One log-sheet row into an adherence record
pub fn log_from_row(row: usize, value: &Value) -> Result<AdherenceRecord> {
    let fields = Fields::new(row, value)?;

    let row_number = fields
        .integer(&["rownumber"])?
        .ok_or_else(|| fields.malformed("missing row_number"))?;
    let medicine_name = fields
        .string(&["medicinename", "name"])?
        .ok_or_else(|| fields.malformed("missing medicineName"))?;

    let supposed = fields.timestamp("supposedlasttakentime")?;
    let actual = fields.timestamp("actuallasttakentime")?;

    Ok(AdherenceRecord {
        row_number,
        entry: LogEntry {
            medicine_name,
            supposed_last_taken_time: supposed,
            actual_last_taken_time: actual,
            is_miss: fields.flag("ismiss")?,
            is_early_dispense: fields.flag("isearlydispense")?,
        },
    })
}

/// Lowercase and drop separators so `Medicine_Name` matches `medicinename`
fn normalise_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

struct Fields {
    row: usize,
    map: Map<String, Value>,
}

impl Fields {
    fn new(row: usize, value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| Error::MalformedRecord {
            row,
            reason: "row is not an object".to_string(),
        })?;
        let map = object
            .iter()
            .map(|(k, v)| (normalise_key(k), v.clone()))
            .collect();
        Ok(Self { row, map })
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedRecord {
            row: self.row,
            reason: reason.into(),
        }
    }

    fn get<'a>(&'a self, keys: &[&'a str]) -> Option<(&'a str, &'a Value)> {
        keys.iter().find_map(|k| {
            self.map
                .get(*k)
                .filter(|v| !v.is_null())
                .map(|v| (*k, v))
        })
    }

    fn string(&self, keys: &[&str]) -> Result<Option<String>> {
        match self.get(keys) {
            None => Ok(None),
            Some((_, Value::String(s))) => Ok(Some(s.clone())),
            Some((_, Value::Number(n))) => Ok(Some(n.to_string())),
            Some((key, other)) => Err(self.malformed(format!("{key} is not text: {other}"))),
        }
    }

    fn integer(&self, keys: &[&str]) -> Result<Option<u64>> {
        match self.get(keys) {
            None => Ok(None),
            Some((key, Value::Number(n))) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.malformed(format!("{key} is not a whole number: {n}"))),
            Some((key, Value::String(s))) if s.trim().is_empty() => {
                Err(self.malformed(format!("{key} is blank")))
            }
            Some((key, Value::String(s))) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| self.malformed(format!("{key} is not a whole number: {s:?}"))),
            Some((key, other)) => {
                Err(self.malformed(format!("{key} is not a number: {other}")))
            }
        }
    }

    fn timestamp(&self, key: &str) -> Result<chrono::DateTime<chrono::Utc>> {
        let text = self
            .string(&[key])?
            .ok_or_else(|| self.malformed(format!("missing {key}")))?;
        parse_sgt(&text).map_err(|e| self.malformed(e.to_string()))
    }

    fn flag(&self, key: &str) -> Result<bool> {
        match self.get(&[key]) {
            Some((_, Value::String(s))) if s.trim() == "1" => Ok(true),
            Some((_, Value::String(s))) if s.trim() == "0" => Ok(false),
            Some((_, Value::Number(n))) if n.as_u64() == Some(1) => Ok(true),
            Some((_, Value::Number(n))) if n.as_u64() == Some(0) => Ok(false),
            Some((_, other)) => Err(self.malformed(format!("{key} must be \"0\" or \"1\", got {other}"))),
            None => Err(self.malformed(format!("missing {key}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reminder_accepts_drifting_column_names() {
        let body = json!([
            { "medicineName": "Paracetamol", "dose": "1", "timesPerDay": 3, "durationDays": 5, "instructions": "with water" },
            { "MedicineName": "Ibuprofen", "Dose": "200mg", "TimesPerDay": "2", "DurationDays": "4", "Instructions": "" },
            { "medicine_name": "Cetirizine", "times_per_day": 1 }
        ]);

        let parsed = parse_reminders(&body).unwrap();
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.records[1].name, "Ibuprofen");
        assert_eq!(parsed.records[1].times_per_day, 2);
        assert_eq!(parsed.records[1].duration_days, 4);
        assert_eq!(parsed.records[2].dose, "");
        assert_eq!(parsed.records[2].duration_days, 0);
    }

    #[test]
    fn test_reminder_rejects_bad_rows_without_dropping_good_ones() {
        let body = json!([
            { "medicineName": "Good", "timesPerDay": 2 },
            { "medicineName": "Zero", "timesPerDay": 0 },
            { "medicineName": "Words", "timesPerDay": "twice" },
            { "timesPerDay": 1 },
            { "medicineName": "Negative", "timesPerDay": 1, "durationDays": -3 },
            "not an object"
        ]);

        let parsed = parse_reminders(&body).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].name, "Good");
        assert_eq!(parsed.rejected.len(), 5);
        assert!(matches!(
            parsed.rejected[0],
            Error::MalformedRecord { row: 2, .. }
        ));
    }

    #[test]
    fn test_non_list_body_is_malformed() {
        let result = parse_reminders(&json!({ "error": "sheet not found" }));
        assert!(matches!(result, Err(Error::MalformedRecord { row: 0, .. })));
    }

    #[test]
    fn test_log_row_parses_sgt_and_flags() {
        let body = json!([{
            "row_number": 2,
            "medicineName": "Paracetamol",
            "supposedLastTakenTime": "17/08/2025, 08:00:00 am",
            "actualLastTakenTime": "17/08/2025, 08:20:00 am",
            "isMiss": "1",
            "isEarlyDispense": "0"
        }]);

        let parsed = parse_logs(&body).unwrap();
        let record = &parsed.records[0];
        assert_eq!(record.row_number, 2);
        assert!(record.entry.is_miss);
        assert!(!record.entry.is_early_dispense);
        assert_eq!(
            (record.entry.actual_last_taken_time - record.entry.supposed_last_taken_time)
                .num_minutes(),
            20
        );
    }

    #[test]
    fn test_log_row_rejects_fuzzy_flags_and_bad_times() {
        let body = json!([
            {
                "row_number": 2, "medicineName": "A",
                "supposedLastTakenTime": "17/08/2025, 08:00:00 am",
                "actualLastTakenTime": "17/08/2025, 08:00:00 am",
                "isMiss": "yes", "isEarlyDispense": "0"
            },
            {
                "row_number": 3, "medicineName": "B",
                "supposedLastTakenTime": "yesterday",
                "actualLastTakenTime": "17/08/2025, 08:00:00 am",
                "isMiss": "0", "isEarlyDispense": "0"
            },
            {
                "row_number": "4", "medicineName": "C",
                "supposedLastTakenTime": "17/08/2025, 08:00:00 am",
                "actualLastTakenTime": "17/08/2025, 07:55:00 am",
                "isMiss": 0, "isEarlyDispense": 1
            }
        ]);

        let parsed = parse_logs(&body).unwrap();
        assert_eq!(parsed.rejected.len(), 2);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].row_number, 4);
        assert!(parsed.records[0].entry.is_early_dispense);
    }

    #[test]
    fn test_normalise_key() {
        assert_eq!(normalise_key("Medicine_Name"), "medicinename");
        assert_eq!(normalise_key("times-per day"), "timesperday");
        assert_eq!(normalise_key("row_number"), "rownumber");
    }
}
