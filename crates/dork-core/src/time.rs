//! Timestamp helpers.
//!
//! Every persisted timestamp in this system is an ISO-8601 string with
//! millisecond precision, never a bare Unix integer
//! §4.2's anti-regression note on the SQLite index's `expiresAt` column.

use chrono::{DateTime, SecondsFormat, Utc};

/// The current instant, formatted as ISO-8601 with millisecond precision.
#[must_use]
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp produced by [`now_iso`] or an equivalent
/// RFC 3339 string.
pub fn parse_iso(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Milliseconds elapsed between two ISO-8601 timestamps (`to - from`).
///
/// Returns `None` if either timestamp fails to parse.
#[must_use]
pub fn millis_between(from: &str, to: &str) -> Option<i64> {
    let a = parse_iso(from).ok()?;
    let b = parse_iso(to).ok()?;
    Some((b - a).num_milliseconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso_parses_back() {
        let s = now_iso();
        assert!(parse_iso(&s).is_ok());
    }

    #[test]
    fn now_iso_has_millisecond_precision() {
        let s = now_iso();
        assert!(s.contains('.'), "expected fractional seconds in {s}");
    }

    #[test]
    fn millis_between_positive() {
        let a = "2026-01-01T00:00:00.000Z";
        let b = "2026-01-01T00:00:01.500Z";
        assert_eq!(millis_between(a, b), Some(1500));
    }

    #[test]
    fn millis_between_invalid_returns_none() {
        assert_eq!(millis_between("not-a-date", "also-not"), None);
    }
}
