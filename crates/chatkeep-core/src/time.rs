// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp normalization and clock abstraction.
//!
//! Persisted records carry timestamps in many shapes: epoch seconds, epoch
//! milliseconds, numeric strings, ISO dates, and legacy ids that were minted
//! from `Date.now()`. Everything is normalized to canonical epoch milliseconds
//! paired with an ISO-8601 string in `YYYY-MM-DDTHH:MM:SS.sssZ` form.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Positive numbers below this are epoch seconds, at or above it epoch milliseconds.
pub const SECONDS_THRESHOLD: f64 = 1e11;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a JSON value into canonical epoch milliseconds.
///
/// Accepts numbers, numeric strings and date strings. Returns `None` for
/// anything else, including zero, negative and out-of-range numbers; callers
/// supply their own fallback.
pub fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(scale_epoch),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Parse a string timestamp (numeric epoch or date) into epoch milliseconds.
pub fn parse_timestamp_str(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse::<f64>().ok().and_then(scale_epoch);
    }

    parse_date_ms(trimmed).filter(|ms| representable(*ms))
}

/// Scale a positive finite epoch number to milliseconds.
fn scale_epoch(n: f64) -> Option<i64> {
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    let ms = if n < SECONDS_THRESHOLD {
        (n * 1000.0).floor()
    } else {
        n.floor()
    };
    if ms > i64::MAX as f64 {
        return None;
    }
    Some(ms as i64).filter(|ms| representable(*ms))
}

fn parse_date_ms(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

fn representable(ms: i64) -> bool {
    DateTime::from_timestamp_millis(ms).is_some()
}

/// Format epoch milliseconds as `YYYY-MM-DDTHH:MM:SS.sssZ`.
///
/// Values produced by [`parse_timestamp_ms`] or a [`Clock`] are always
/// representable; anything else formats as the Unix epoch.
pub fn iso_from_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Source of the current wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seconds_are_scaled_to_millis() {
        assert_eq!(parse_timestamp_ms(&json!(1_700_000_000)), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp_ms(&json!(1_700_000_000.5)), Some(1_700_000_000_500));
    }

    #[test]
    fn millis_pass_through() {
        assert_eq!(
            parse_timestamp_ms(&json!(1_700_000_000_123_i64)),
            Some(1_700_000_000_123)
        );
        assert_eq!(parse_timestamp_ms(&json!(1_700_000_000_123.9)), Some(1_700_000_000_123));
    }

    #[test]
    fn numeric_strings_follow_number_rules() {
        assert_eq!(parse_timestamp_ms(&json!("1700000000")), Some(1_700_000_000_000));
        assert_eq!(
            parse_timestamp_ms(&json!(" 1700000000123 ")),
            Some(1_700_000_000_123)
        );
        assert_eq!(parse_timestamp_ms(&json!("0")), None);
    }

    #[test]
    fn iso_dates_parse() {
        assert_eq!(
            parse_timestamp_ms(&json!("2024-01-01T00:00:00.000Z")),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            parse_timestamp_ms(&json!("2024-01-01T08:00:00+08:00")),
            Some(1_704_067_200_000)
        );
        assert_eq!(parse_timestamp_ms(&json!("2024-01-01")), Some(1_704_067_200_000));
    }

    #[test]
    fn malformed_input_returns_none() {
        assert_eq!(parse_timestamp_ms(&json!(null)), None);
        assert_eq!(parse_timestamp_ms(&json!("")), None);
        assert_eq!(parse_timestamp_ms(&json!("   ")), None);
        assert_eq!(parse_timestamp_ms(&json!("not a date")), None);
        assert_eq!(
            parse_timestamp_ms(&json!("3f2504e0-4f89-41d3-9a0c-0305e82c3301")),
            None
        );
        assert_eq!(parse_timestamp_ms(&json!(-5)), None);
        assert_eq!(parse_timestamp_ms(&json!(0)), None);
        assert_eq!(parse_timestamp_ms(&json!(true)), None);
        assert_eq!(parse_timestamp_ms(&json!({"ms": 1})), None);
        assert_eq!(parse_timestamp_ms(&json!(1e300)), None);
    }

    #[test]
    fn iso_formatting_matches_canonical_shape() {
        assert_eq!(iso_from_ms(1_704_067_200_000), "2024-01-01T00:00:00.000Z");
        assert_eq!(iso_from_ms(1_704_067_200_042), "2024-01-01T00:00:00.042Z");
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    proptest::proptest! {
        #[test]
        fn iso_string_parses_back_to_same_millis(ms in 100_000_000_000_i64..4_102_444_800_000_i64) {
            let iso = iso_from_ms(ms);
            proptest::prop_assert_eq!(parse_timestamp_str(&iso), Some(ms));
        }
    }
}
