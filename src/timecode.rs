//! Conversions between seconds and `HH:MM:SS.mmm` timestamps.

use crate::error::{Result, SpliceError};

/// Format seconds as `HH:MM:SS.mmm`.
///
/// Sub-millisecond precision is truncated, not rounded. Hours are padded to
/// two digits and grow as needed.
pub fn seconds_to_timestamp(seconds: f64) -> Result<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SpliceError::InvalidInput(format!(
            "cannot format {} as a timestamp; clamp to >= 0 first",
            seconds
        )));
    }

    let total_ms = to_millis(seconds);
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;

    Ok(format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, ms))
}

/// Parse `HH:MM:SS[.,]mmm`, `MM:SS[.,]mmm` or `SS[.,]mmm` into seconds.
///
/// The fractional part is optional. Short fractions are right-padded
/// (`.5` is 500 ms) and long ones are cut to milliseconds.
pub fn timestamp_to_seconds(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(parse_error(text, "empty timestamp"));
    }

    let (clock, fraction) = match trimmed.find(['.', ',']) {
        Some(pos) => (&trimmed[..pos], Some(&trimmed[pos + 1..])),
        None => (trimmed, None),
    };

    let millis = match fraction {
        Some(f) => parse_fraction(text, f)?,
        None => 0,
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let fields = parts
        .iter()
        .map(|p| parse_field(text, p))
        .collect::<Result<Vec<u64>>>()?;

    let (hours, minutes, secs) = match fields.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        [s] => (0, 0, *s),
        _ => return Err(parse_error(text, "too many ':' separated fields")),
    };

    if fields.len() >= 2 && secs >= 60 {
        return Err(parse_error(text, "seconds field must be below 60"));
    }
    if fields.len() == 3 && minutes >= 60 {
        return Err(parse_error(text, "minutes field must be below 60"));
    }

    let total_ms = hours
        .checked_mul(3_600_000)
        .and_then(|ms| ms.checked_add(minutes.checked_mul(60_000)?))
        .and_then(|ms| ms.checked_add(secs.checked_mul(1000)?))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(|| parse_error(text, "timestamp out of range"))?;
    Ok(total_ms as f64 / 1000.0)
}

/// Whole milliseconds in `seconds`, truncated.
///
/// A product within a few ulps of a whole millisecond snaps to it, so
/// `1.001` (stored as `1.000999..`) stays `1001` ms instead of `1000`.
fn to_millis(seconds: f64) -> u64 {
    let ms = seconds * 1000.0;
    let nearest = ms.round();
    if (ms - nearest).abs() <= nearest.max(1.0) * f64::EPSILON * 4.0 {
        nearest as u64
    } else {
        ms.floor() as u64
    }
}

fn parse_field(original: &str, field: &str) -> Result<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(parse_error(original, "expected digits between ':'"));
    }
    field
        .parse::<u64>()
        .map_err(|e| parse_error(original, &e.to_string()))
}

fn parse_fraction(original: &str, fraction: &str) -> Result<u64> {
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(parse_error(original, "expected digits after the millisecond separator"));
    }
    let digits: String = fraction.chars().chain("00".chars()).take(3).collect();
    digits
        .parse::<u64>()
        .map_err(|e| parse_error(original, &e.to_string()))
}

fn parse_error(text: &str, reason: &str) -> SpliceError {
    SpliceError::Parse(format!("invalid timestamp '{}': {}", text, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_zero() {
        assert_eq!(seconds_to_timestamp(0.0).unwrap(), "00:00:00.000");
    }

    #[test]
    fn test_format_truncates() {
        assert_eq!(seconds_to_timestamp(61.5).unwrap(), "00:01:01.500");
        assert_eq!(seconds_to_timestamp(3661.1239).unwrap(), "01:01:01.123");
        assert_eq!(seconds_to_timestamp(9.9999).unwrap(), "00:00:09.999");
        assert_eq!(seconds_to_timestamp(1.001).unwrap(), "00:00:01.001");
    }

    #[test]
    fn test_format_does_not_round_up_near_boundary() {
        assert_eq!(seconds_to_timestamp(0.000_999_999_9).unwrap(), "00:00:00.000");
        assert_eq!(seconds_to_timestamp(59.999_999).unwrap(), "00:00:59.999");
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        for huge in ["99999999999999999:00:00,000", "5124095576030431:00:00.000"] {
            assert!(
                matches!(timestamp_to_seconds(huge), Err(SpliceError::Parse(_))),
                "expected parse error for {:?}",
                huge
            );
        }
        // Too many digits for u64 at all.
        assert!(timestamp_to_seconds("99999999999999999999999:00:00").is_err());
    }

    #[test]
    fn test_format_large_hours() {
        assert_eq!(seconds_to_timestamp(360_000.0).unwrap(), "100:00:00.000");
    }

    #[test]
    fn test_format_rejects_negative() {
        assert!(matches!(
            seconds_to_timestamp(-0.001),
            Err(SpliceError::InvalidInput(_))
        ));
        assert!(seconds_to_timestamp(f64::NAN).is_err());
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(timestamp_to_seconds("01:02:03,456").unwrap(), 3723.456);
        assert_eq!(timestamp_to_seconds("01:02:03.456").unwrap(), 3723.456);
        assert_eq!(timestamp_to_seconds("02:03.5").unwrap(), 123.5);
        assert_eq!(timestamp_to_seconds("75,25").unwrap(), 75.25);
        assert_eq!(timestamp_to_seconds(" 00:00:10 ").unwrap(), 10.0);
        assert_eq!(timestamp_to_seconds("00:00:01.23456").unwrap(), 1.234);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "abc", "1:2:3:4", "00:61:00.000", "00:00:60,000", "00::01", "00:00:01.", "00:00:01.x"] {
            assert!(
                matches!(timestamp_to_seconds(bad), Err(SpliceError::Parse(_))),
                "expected parse error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_round_trip_within_a_millisecond() {
        let mut value = 0.0;
        while value < 100.0 * 3600.0 {
            let text = seconds_to_timestamp(value).unwrap();
            let back = timestamp_to_seconds(&text).unwrap();
            assert!(
                (back - value).abs() < 0.001,
                "{} -> {} -> {}",
                value,
                text,
                back
            );
            value += 1234.5678;
        }
    }
}
