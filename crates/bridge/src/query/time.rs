//! Time expression parsing
//!
//! Accepts `now`, epoch milliseconds, RFC 3339 timestamps and relative
//! expressions such as `now-1h`, `now-2d6h` or `now-1h30m15s`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

/// Values at or below this are treated as seconds, not milliseconds.
const EPOCH_MS_THRESHOLD: i64 = 1_000_000_000_000;

lazy_static! {
    static ref RELATIVE: Regex =
        Regex::new(r"^now-(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?$").unwrap();
}

/// Parse a user supplied time string relative to `now`.
pub fn parse_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(parse_error(input, "empty time string"));
    }

    if input == "now" {
        return Ok(now);
    }

    if let Some(ts) = parse_epoch_millis(input) {
        return Ok(ts);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Some(offset) = parse_relative(input)? {
        return now
            .checked_sub_signed(offset)
            .ok_or_else(|| parse_error(input, "offset out of range"));
    }

    Err(parse_error(
        input,
        "expected now, epoch milliseconds, RFC 3339 or now-<N>d<N>h<N>m<N>s",
    ))
}

fn parse_epoch_millis(input: &str) -> Option<DateTime<Utc>> {
    if !input.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let ms: i64 = input.parse().ok()?;
    if ms <= EPOCH_MS_THRESHOLD {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}

/// Returns `Ok(None)` when the input is not a relative expression at all.
fn parse_relative(input: &str) -> Result<Option<Duration>> {
    let Some(caps) = RELATIVE.captures(input) else {
        return Ok(None);
    };

    // days, hours, minutes, seconds
    const UNIT_SECONDS: [i64; 4] = [86_400, 3_600, 60, 1];

    let mut total: i64 = 0;
    let mut any = false;
    for (idx, unit) in UNIT_SECONDS.iter().enumerate() {
        let Some(m) = caps.get(idx + 1) else {
            continue;
        };
        any = true;
        let n: i64 = m
            .as_str()
            .parse()
            .map_err(|_| parse_error(input, "component out of range"))?;
        total = n
            .checked_mul(*unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| parse_error(input, "offset out of range"))?;
    }

    if !any {
        return Err(parse_error(input, "relative time needs at least one component"));
    }

    Duration::try_seconds(total)
        .map(Some)
        .ok_or_else(|| parse_error(input, "offset out of range"))
}

fn parse_error(input: &str, reason: &str) -> Error {
    Error::Parse {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
