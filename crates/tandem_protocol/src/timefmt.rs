//! Wall-clock timestamps carried inside sync payloads.
//!
//! The wire format is fixed: `YYYY-MM-DD HH:MM:SS.mmm`, local time,
//! millisecond resolution. Envelope timestamps are plain epoch milliseconds
//! and live in [`crate::identity`].

use chrono::{Local, NaiveDateTime};

use crate::error::{ProtocolError, Result};

const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Current local time in the wire format.
pub fn now_wire() -> String {
    Local::now().format(WIRE_FORMAT).to_string()
}

/// Parse a wire timestamp back into a naive local datetime.
pub fn parse_wire(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, WIRE_FORMAT)
        .map_err(|_| ProtocolError::InvalidTimestamp(value.to_string()))
}

/// Milliseconds elapsed since `value` was stamped. Negative when the sender's
/// clock runs ahead of ours; callers treat that as fresh.
pub fn age_millis(value: &str) -> Result<i64> {
    let stamped = parse_wire(value)?;
    Ok((Local::now().naive_local() - stamped).num_milliseconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_shape() {
        let now = now_wire();
        // YYYY-MM-DD HH:MM:SS.mmm
        assert_eq!(now.len(), 23, "unexpected length: {now:?}");
        assert_eq!(&now[4..5], "-");
        assert_eq!(&now[10..11], " ");
        assert_eq!(&now[19..20], ".");
    }

    #[test]
    fn test_roundtrip() {
        let now = now_wire();
        let parsed = parse_wire(&now).unwrap();
        assert_eq!(parsed.format(WIRE_FORMAT).to_string(), now);
    }

    #[test]
    fn test_fresh_stamp_has_tiny_age() {
        let age = age_millis(&now_wire()).unwrap();
        assert!((-5..1_000).contains(&age), "age was {age}");
    }

    #[test]
    fn test_explicit_value() {
        let parsed = parse_wire("2026-03-01 08:15:30.250").unwrap();
        assert_eq!(parsed.format("%H:%M:%S%.3f").to_string(), "08:15:30.250");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_wire("not a timestamp").is_err());
        assert!(parse_wire("2026-03-01T08:15:30.250Z").is_err());
    }
}
