//! Time header formats.
//!
//! OBEX carries modification times either as ISO-8601 basic format text
//! (`YYYYMMDDThhmmss`, with a trailing `Z` for UTC and local time otherwise)
//! or as 4-byte POSIX seconds.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::ProtocolError;

const BASIC_FORMAT: &str = "%Y%m%dT%H%M%S";
const EXTENDED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses an ISO-8601 time header value.
///
/// The extended form (`YYYY-MM-DDThh:mm:ss`) is accepted as well since some
/// peers send it.
pub fn parse_iso8601(text: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let text = text.trim();
    let (body, utc) = match text.strip_suffix('Z') {
        Some(body) => (body, true),
        None => (text, false),
    };

    let naive = NaiveDateTime::parse_from_str(body, BASIC_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(body, EXTENDED_FORMAT))
        .map_err(|_| ProtocolError::InvalidTime(text.to_string()))?;

    if utc {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| ProtocolError::InvalidTime(text.to_string()))
}

/// Converts a POSIX time header value.
pub fn from_posix(secs: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(secs), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Formats a time as ISO-8601 basic format in UTC (`YYYYMMDDThhmmssZ`).
pub fn format_iso8601(time: &DateTime<Utc>) -> String {
    format!("{}Z", time.format(BASIC_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_basic_format() {
        let t = parse_iso8601("20240131T235958Z").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap());
    }

    #[test]
    fn parses_extended_format() {
        let t = parse_iso8601("2024-01-31T23:59:58Z").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap());
    }

    #[test]
    fn local_time_is_converted() {
        let t = parse_iso8601("20240615T120000").unwrap();
        let expected = Local
            .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(t, expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_iso8601("2024").is_err());
        assert!(parse_iso8601("").is_err());
    }

    #[test]
    fn format_is_basic_utc() {
        let t = Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(format_iso8601(&t), "20010203T040506Z");
        assert_eq!(parse_iso8601(&format_iso8601(&t)).unwrap(), t);
    }

    #[test]
    fn posix_epoch() {
        assert_eq!(from_posix(0), DateTime::<Utc>::UNIX_EPOCH);
    }
}
