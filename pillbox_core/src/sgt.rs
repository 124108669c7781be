//! Singapore-time (UTC+8) display strings.
//!
//! The log sheet stores every timestamp as wall-clock SGT text in the
//! `en-SG` locale shape, e.g. `17/08/2025, 08:00:00 pm`. This module is the
//! only place that text is produced or read back.

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;

/// Seconds east of UTC for Singapore time
pub const SGT_OFFSET_SECS: i32 = 8 * 3600;

const DISPLAY_FORMAT: &str = "%d/%m/%Y, %I:%M:%S %P";

static SGT: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::east_opt(SGT_OFFSET_SECS).expect("UTC+8 is a valid offset"));

/// The fixed UTC+8 offset
pub fn offset() -> FixedOffset {
    *SGT
}

/// Format an instant as `DD/MM/YYYY, HH:MM:SS am|pm` in SGT.
///
/// Sub-second precision is dropped.
pub fn format_sgt(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&offset()).format(DISPLAY_FORMAT).to_string()
}

/// Parse a `DD/MM/YYYY, HH:MM:SS am|pm` SGT string back into an instant.
///
/// Fields may be separated by any run of commas and whitespace, and the
/// meridiem is case-insensitive. Every malformed component is reported by
/// name through [`Error::Parse`].
pub fn parse_sgt(input: &str) -> Result<DateTime<Utc>> {
    let mut parts = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());

    let date_part = parts.next().ok_or_else(|| bad("date", input))?;
    let time_part = parts.next().ok_or_else(|| bad("time", input))?;
    let meridiem = parts.next().ok_or_else(|| bad("meridiem", input))?;
    if parts.next().is_some() {
        return Err(bad("trailing input", input));
    }

    let [day, month, year] = split_three(date_part, '/', ["day", "month", "year"], input)?;
    let [hour, minute, second] =
        split_three(time_part, ':', ["hour", "minute", "second"], input)?;

    if !(1..=12).contains(&month) {
        return Err(bad("month", input));
    }
    if !(1..=12).contains(&hour) {
        return Err(bad("hour", input));
    }
    if minute > 59 {
        return Err(bad("minute", input));
    }
    if second > 59 {
        return Err(bad("second", input));
    }

    let hour = match meridiem.to_ascii_lowercase().as_str() {
        "pm" if hour < 12 => hour + 12,
        "am" if hour == 12 => 0,
        "am" | "pm" => hour,
        _ => return Err(bad("meridiem", input)),
    };

    let year = i32::try_from(year).map_err(|_| bad("year", input))?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| bad("day", input))?;
    let naive = date
        .and_hms_opt(hour, minute, second)
        .ok_or_else(|| bad("time", input))?;

    offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| bad("time", input))
}

/// Minutes since SGT midnight, used to place a dose on a 24h axis
pub fn minutes_of_day(instant: DateTime<Utc>) -> u32 {
    let local = instant.with_timezone(&offset());
    local.hour() * 60 + local.minute()
}

/// SGT calendar date as `DD/MM/YYYY`
pub fn date_label(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&offset()).format("%d/%m/%Y").to_string()
}

fn split_three(
    part: &str,
    sep: char,
    names: [&'static str; 3],
    input: &str,
) -> Result<[u32; 3]> {
    let mut out = [0u32; 3];
    let mut fields = part.split(sep);
    for (slot, name) in out.iter_mut().zip(names) {
        let raw = fields.next().ok_or_else(|| bad(name, input))?;
        *slot = raw.trim().parse().map_err(|_| bad(name, input))?;
    }
    if fields.next().is_some() {
        return Err(bad(names[2], input));
    }
    Ok(out)
}

fn bad(field: &'static str, input: &str) -> Error {
    Error::Parse {
        field,
        value: input.to_string(),
    }
}
