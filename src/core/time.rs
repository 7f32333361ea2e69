//! Parsing and validation of user-supplied time bounds
//!
//! Sources disagree about timestamp formats, so everything is normalised
//! to UTC on the way in and formatted per-source on the way out.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeError {
    #[error("'{input}' cannot be parsed as a date or timestamp (expected YYYY-MM-DD or RFC 3339)")]
    Unparseable { input: String },

    #[error("start time {start} is after end time {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Parse a user-supplied time string to a UTC timestamp.
///
/// Accepts RFC 3339 timestamps (offset preserved, then converted),
/// naive datetimes (`YYYY-MM-DDTHH:MM:SS`, taken as UTC) and bare dates
/// (midnight UTC).
pub fn parse_time(input: &str) -> Result<DateTime<Utc>, TimeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    Err(TimeError::Unparseable {
        input: input.to_string(),
    })
}

/// Check that start does not exceed end when both are present
pub fn validate_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), TimeError> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(TimeError::InvalidRange { start: s, end: e });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_date() {
        let dt = parse_time("2020-01-31").unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-01-31T00:00:00+00:00");
    }

    #[test]
    fn test_parse_rfc3339_converts_to_utc() {
        let dt = parse_time("2020-06-01T12:00:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-06-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_naive_datetime() {
        let dt = parse_time("2020-06-01T12:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-06-01T12:30:00+00:00");
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_time("last tuesday").unwrap_err();
        assert!(matches!(err, TimeError::Unparseable { .. }));
    }

    #[test]
    fn test_validate_range() {
        let start = parse_time("2020-01-01").unwrap();
        let end = parse_time("2020-12-31").unwrap();
        assert!(validate_range(Some(start), Some(end)).is_ok());
        assert!(validate_range(Some(end), Some(start)).is_err());
        assert!(validate_range(None, Some(end)).is_ok());
        assert!(validate_range(Some(start), None).is_ok());
        assert!(validate_range(None, None).is_ok());
    }
}
