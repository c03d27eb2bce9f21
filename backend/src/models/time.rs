//! Timestamp parsing shared by the validator, prediction queries and reports.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse a timestamp given either as RFC 3339 / ISO-8601 date-time or as a
/// bare `YYYY-MM-DD` date (interpreted as midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

/// Parse the upper bound of a date range.
///
/// A bare `YYYY-MM-DD` date covers the whole day, so it resolves to the last
/// representable instant of that day.
pub fn parse_range_end(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let end = date.and_hms_milli_opt(23, 59, 59, 999)?;
        return Some(Utc.from_utc_datetime(&end));
    }
    parse_timestamp(value)
}
