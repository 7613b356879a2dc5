//! Expands a daily medication schedule into concrete reminder times.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};

/// Number of days, starting today, that receive reminders
pub const REMINDER_HORIZON_DAYS: u64 = 30;

static TIME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d{1,2}):(\d{2})\s*(am|pm)$").expect("valid regex"));

/// Reminder times produced for one medication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializedSchedule {
    pub times: Vec<DateTime<Utc>>,
    /// Tokens that could not be parsed
    pub skipped: Vec<String>,
}

/// Whether a frequency description asks for daily reminders
#[must_use]
pub fn is_daily(frequency: &str) -> bool {
    frequency.to_lowercase().contains("daily")
}

/// Parse a single `H:MM AM/PM` token into a 24-hour time
pub fn parse_time_of_day(token: &str) -> Result<NaiveTime> {
    let caps = TIME_TOKEN
        .captures(token.trim())
        .ok_or_else(|| AssistantError::InvalidTime(format!("expected H:MM AM/PM, got '{token}'")))?;

    let hour: u32 = caps[1]
        .parse()
        .map_err(|_| AssistantError::InvalidTime(format!("bad hour in '{token}'")))?;
    let minute: u32 = caps[2]
        .parse()
        .map_err(|_| AssistantError::InvalidTime(format!("bad minute in '{token}'")))?;

    if !(1..=12).contains(&hour) {
        return Err(AssistantError::InvalidTime(format!("hour out of range in '{token}'")));
    }

    let hour = match (caps[3].to_ascii_lowercase().as_str(), hour) {
        ("am", 12) => 0,
        ("pm", h) if h < 12 => h + 12,
        (_, h) => h,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| AssistantError::InvalidTime(format!("minute out of range in '{token}'")))
}

/// Build reminder times for `today` and the following days.
///
/// Frequencies without "daily" produce nothing. Each comma-separated token of
/// `time_of_day` yields one reminder per day; unparseable tokens are logged
/// and skipped.
#[must_use]
pub fn materialize_daily(frequency: &str, time_of_day: &str, today: NaiveDate) -> MaterializedSchedule {
    let mut schedule = MaterializedSchedule::default();

    if !is_daily(frequency) {
        debug!(frequency, "Frequency is not daily, no reminders created");
        return schedule;
    }

    for token in time_of_day.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let time = match parse_time_of_day(token) {
            Ok(time) => time,
            Err(e) => {
                warn!(token, error = %e, "Skipping unparseable time of day");
                schedule.skipped.push(token.to_string());
                continue;
            },
        };

        for offset in 0..REMINDER_HORIZON_DAYS {
            if let Some(day) = today.checked_add_days(Days::new(offset)) {
                schedule.times.push(Utc.from_utc_datetime(&day.and_time(time)));
            }
        }
    }

    schedule
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_of_day_normalizes_to_24_hour() {
        assert_eq!(parse_time_of_day("8:00 AM").unwrap(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(parse_time_of_day("8:30 pm").unwrap(), NaiveTime::from_hms_opt(20, 30, 0).unwrap());
        assert_eq!(parse_time_of_day("12:15 AM").unwrap(), NaiveTime::from_hms_opt(0, 15, 0).unwrap());
        assert_eq!(parse_time_of_day("12:00 PM").unwrap(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_time_of_day_rejects_garbage() {
        assert!(parse_time_of_day("noon").is_err());
        assert!(parse_time_of_day("13:00 PM").is_err());
        assert!(parse_time_of_day("8:75 AM").is_err());
        assert!(parse_time_of_day("08:00").is_err());
    }

    #[test]
    fn test_bad_token_does_not_abort_others() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let schedule = materialize_daily("Twice daily", "8:00 AM, soon, 9:00 PM", today);
        assert_eq!(schedule.times.len(), 60);
        assert_eq!(schedule.skipped, vec!["soon".to_string()]);
    }

    #[test]
    fn test_weekly_frequency_yields_nothing() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(materialize_daily("Weekly", "8:00 AM", today).times.is_empty());
    }
}
