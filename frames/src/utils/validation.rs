use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a query bound. RFC 3339 with an offset is converted to UTC; a
/// timestamp without an offset, or a bare date, is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // An unencoded `+` in a query string arrives as a space.
    if let Some((date_time, offset)) = raw.rsplit_once(' ') {
        if date_time.contains('T') {
            if let Ok(ts) = DateTime::parse_from_rfc3339(&format!("{date_time}+{offset}")) {
                return Some(ts.with_timezone(&Utc));
            }
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_rfc3339_offsets_are_normalized() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 10, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-04-10T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-04-10T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-04-10T14:00:00 02:00"), Some(expected));
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 10, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-04-10T12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-04-10 12:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-04-10"),
            Some(Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_fractional_seconds() {
        let ts = parse_timestamp("2025-04-10T12:00:00.250").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("2025-13-40T00:00:00"), None);
    }
}
