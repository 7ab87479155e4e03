//! Field coercions: tri-state booleans and epoch timestamps.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::Value;

/// Epoch values above this are milliseconds, everything else is seconds.
pub const MILLIS_THRESHOLD: i64 = 10_000_000_000;

const TRUE_WORDS: [&str; 5] = ["true", "t", "yes", "y", "1"];
const FALSE_WORDS: [&str; 5] = ["false", "f", "no", "n", "0"];

/// Parse a value as a boolean.
///
/// Booleans pass through, integers 0/1 map to false/true, and the words in
/// [`TRUE_WORDS`]/[`FALSE_WORDS`] match case-insensitively after trimming.
/// Returns `None` for anything else, null included.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i {
                    0 => Some(false),
                    1 => Some(true),
                    _ => None,
                }
            } else {
                match n.as_f64() {
                    Some(f) if f == 0.0 => Some(false),
                    Some(f) if f == 1.0 => Some(true),
                    _ => None,
                }
            }
        }
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            if TRUE_WORDS.contains(&s.as_str()) {
                Some(true)
            } else if FALSE_WORDS.contains(&s.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Read a value as an integer epoch: JSON integers, floats (truncated) and
/// numeric strings.
fn parse_epoch(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Convert an epoch value to a UTC ISO-8601 string with a `+00:00` offset.
///
/// Values above [`MILLIS_THRESHOLD`] are read as milliseconds. Fractional
/// seconds appear (as microseconds) only when non-zero. Returns `None` for
/// unparsable input or instants outside years 1..=9999.
pub fn epoch_to_iso(value: &Value) -> Option<String> {
    let raw = parse_epoch(value)?;
    let instant = if raw > MILLIS_THRESHOLD {
        DateTime::<Utc>::from_timestamp_millis(raw)?
    } else {
        DateTime::<Utc>::from_timestamp(raw, 0)?
    };

    if !(1..=9999).contains(&instant.year()) {
        return None;
    }

    let iso = if instant.nanosecond() == 0 {
        instant.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
    } else {
        instant.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
    };
    Some(iso)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bool_true_inputs() {
        for v in [json!(true), json!("T"), json!("yes"), json!("y"), json!("1"), json!(1)] {
            assert_eq!(parse_bool(&v), Some(true), "input {}", v);
        }
    }

    #[test]
    fn test_parse_bool_false_inputs() {
        for v in [json!(false), json!("f"), json!("no"), json!("n"), json!("0"), json!(0)] {
            assert_eq!(parse_bool(&v), Some(false), "input {}", v);
        }
    }

    #[test]
    fn test_parse_bool_case_and_whitespace() {
        assert_eq!(parse_bool(&json!(" TRUE ")), Some(true));
        assert_eq!(parse_bool(&json!("No")), Some(false));
        assert_eq!(parse_bool(&json!(1.0)), Some(true));
    }

    #[test]
    fn test_parse_bool_rejects_other_values() {
        for v in [json!(2), json!("maybe"), json!(""), json!(null), json!(0.5), json!([1])] {
            assert_eq!(parse_bool(&v), None, "input {}", v);
        }
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(
            epoch_to_iso(&json!(1700000000)).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }

    #[test]
    fn test_epoch_millis_same_instant() {
        assert_eq!(
            epoch_to_iso(&json!(1700000000000i64)).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }

    #[test]
    fn test_epoch_millis_fraction() {
        assert_eq!(
            epoch_to_iso(&json!(1700000000123i64)).as_deref(),
            Some("2023-11-14T22:13:20.123000+00:00")
        );
    }

    #[test]
    fn test_epoch_threshold_is_exclusive() {
        // Exactly at the threshold the value is still seconds
        assert_eq!(
            epoch_to_iso(&json!(MILLIS_THRESHOLD)).as_deref(),
            Some("2286-11-20T17:46:40+00:00")
        );
    }

    #[test]
    fn test_epoch_numeric_string() {
        assert_eq!(
            epoch_to_iso(&json!(" 1700000000 ")).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }

    #[test]
    fn test_epoch_unparsable() {
        assert_eq!(epoch_to_iso(&json!("abc")), None);
        assert_eq!(epoch_to_iso(&json!("")), None);
        assert_eq!(epoch_to_iso(&json!(null)), None);
        assert_eq!(epoch_to_iso(&json!(true)), None);
    }
}
