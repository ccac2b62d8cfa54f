//! API timestamp normalization

use chrono::{DateTime, FixedOffset};

/// Layouts tried after RFC 3339, all offset-aware
const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
];

/// Parse an API timestamp into an offset-aware value.
///
/// A trailing `Z` is read as `+00:00`. Absent or empty input yields `None`;
/// a present value that does not parse is an error, never a default.
pub fn normalize(raw: Option<&str>) -> Result<Option<DateTime<FixedOffset>>, chrono::ParseError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let text = match raw.strip_suffix('Z') {
        Some(base) => format!("{base}+00:00"),
        None => raw.to_string(),
    };

    let first = match DateTime::parse_from_rfc3339(&text) {
        Ok(dt) => return Ok(Some(dt)),
        Err(e) => e,
    };
    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&text, fmt).ok())
        .map(Some)
        .ok_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn z_suffix_becomes_utc_offset() {
        let dt = normalize(Some("2024-05-06T07:08:09Z")).unwrap().unwrap();
        assert_eq!(*dt.offset(), utc());
        assert_eq!(dt.to_rfc3339(), "2024-05-06T07:08:09+00:00");
    }

    #[test]
    fn fractional_seconds_with_z() {
        let dt = normalize(Some("2024-05-06T07:08:09.123456Z")).unwrap().unwrap();
        assert_eq!(*dt.offset(), utc());
        assert_eq!(dt.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn explicit_offset_kept() {
        let dt = normalize(Some("2024-05-06T07:08:09+05:30")).unwrap().unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn space_separator_and_minutes_only() {
        assert!(normalize(Some("2024-05-06 07:08:09Z")).unwrap().is_some());
        assert!(normalize(Some("2024-05-06T07:08Z")).unwrap().is_some());
    }

    #[test]
    fn absent_and_empty_are_none() {
        assert_eq!(normalize(None).unwrap(), None);
        assert_eq!(normalize(Some("")).unwrap(), None);
        assert_eq!(normalize(Some("   ")).unwrap(), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(normalize(Some("yesterday")).is_err());
        assert!(normalize(Some("2024-13-45T00:00:00Z")).is_err());
    }

    #[test]
    fn naive_timestamp_is_rejected() {
        assert!(normalize(Some("2024-05-06T07:08:09")).is_err());
    }
}
