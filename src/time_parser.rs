//! Natural-language time expressions
//!
//! Recognizes a handful of relative phrases ("tomorrow", "in 3 days", "9pm")
//! against a reference instant. Patterns are tried in a fixed order and the
//! first match wins, so "tomorrow at 2pm" only moves the date.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AssistantError, Result};

static IN_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"in (\d+) days?").expect("valid regex"));
static IN_HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"in (\d+) hours?").expect("valid regex"));
static CLOCK_HOUR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)(am|pm)").expect("valid regex"));

/// Which rule matched an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matched {
    Tomorrow,
    Today,
    InDays(i64),
    InHours(i64),
    ClockHour(u32),
}

/// Find the first rule that applies to `text`, without evaluating it
#[must_use]
pub fn classify(text: &str) -> Option<Matched> {
    let lowered = text.to_lowercase();

    if lowered.contains("tomorrow") {
        return Some(Matched::Tomorrow);
    }
    if lowered.contains("today") {
        return Some(Matched::Today);
    }
    if let Some(caps) = IN_DAYS.captures(&lowered) {
        return caps[1].parse().ok().map(Matched::InDays);
    }
    if let Some(caps) = IN_HOURS.captures(&lowered) {
        return caps[1].parse().ok().map(Matched::InHours);
    }
    if let Some(caps) = CLOCK_HOUR.captures(&lowered) {
        let hour: u32 = caps[1].parse().ok()?;
        // 12am stays 12; only pm below noon shifts
        let hour = if &caps[2] == "pm" && hour < 12 { hour + 12 } else { hour };
        return Some(Matched::ClockHour(hour));
    }

    None
}

/// Evaluate `text` against `now`.
///
/// Returns `None` when no rule matches, when the offset overflows the calendar,
/// or when the clock hour is out of range (e.g. "25pm").
#[must_use]
pub fn try_parse_natural_language(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match classify(text)? {
        Matched::Tomorrow => now.checked_add_signed(Duration::try_days(1)?),
        Matched::Today => Some(now),
        Matched::InDays(days) => now.checked_add_signed(Duration::try_days(days)?),
        Matched::InHours(hours) => now.checked_add_signed(Duration::try_hours(hours)?),
        Matched::ClockHour(hour) => now
            .with_hour(hour)?
            .with_minute(0)?
            .with_second(0)?
            .with_nanosecond(0),
    }
}

/// Evaluate `text` against `now`, falling back to `now` when nothing applies
#[must_use]
pub fn parse_natural_language_date(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    try_parse_natural_language(text, now).unwrap_or(now)
}

/// Resolve a timestamp field from a request.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (taken as UTC), `YYYY-MM-DD`
/// (midnight UTC) or any expression the natural-language rules recognize.
pub fn resolve_timestamp(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AssistantError::InvalidTime("empty timestamp".to_string()));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)));
    }

    try_parse_natural_language(trimmed, now)
        .ok_or_else(|| AssistantError::InvalidTime(format!("unrecognized time expression: {trimmed}")))
}
