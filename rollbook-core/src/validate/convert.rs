//! Cell text conversions shared by the validators

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

/// The one accepted calendar-date pattern
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Positive integer roll number
pub fn parse_roll(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|roll| *roll > 0)
}

/// Strict `YYYY-MM-DD` date
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    // chrono accepts unpadded fields; the upload format does not
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

/// Deserialize a stored date with the same strict pattern as uploads
pub fn deserialize_calendar_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_calendar_date(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid date {raw:?}, expected YYYY-MM-DD"))
    })
}

/// Finite decimal number with a `.` separator
pub fn parse_score(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Admission year, falling back to `current_year` when blank or not positive.
///
/// Returns `None` only for text that is not an integer.
pub fn parse_admission_year(raw: &str, current_year: i32) -> Option<i32> {
    if raw.is_empty() {
        return Some(current_year);
    }
    let year = raw.parse::<i32>().ok()?;
    Some(if year <= 0 { current_year } else { year })
}
