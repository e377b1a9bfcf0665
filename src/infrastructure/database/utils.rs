//! Database utility functions
//!
//! Datetime parsing shared by the row mappers.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse datetime from multiple formats (RFC3339 and `SQLite` default format)
///
/// Rows written by this crate carry RFC3339 timestamps, but databases touched
/// by external tooling may hold `SQLite`'s default datetime format.
///
/// Supports:
/// - RFC3339: "2025-10-29T17:28:13Z", "2025-10-29T17:28:13+00:00"
/// - `SQLite` default: "2025-10-29 17:28:13"
/// - ISO 8601 without timezone: "2025-10-29T17:28:13"
///
/// # Examples
/// ```
/// use warden::infrastructure::database::utils::parse_datetime;
///
/// let dt1 = parse_datetime("2025-10-29T17:28:13Z").unwrap();
/// let dt2 = parse_datetime("2025-10-29 17:28:13").unwrap();
/// assert_eq!(dt1, dt2);
/// ```
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite's default datetime format, interpreted as UTC
    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
    }

    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
    }

    // Surface the RFC3339 error when every format fails
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
