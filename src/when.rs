//! Parsing of user-supplied times and dates.
//!
//! Accepted forms for a point in time:
//! - `now`, `today`, `tomorrow`
//! - RFC 3339 timestamps (`2026-05-01T09:30:00Z`)
//! - `YYYY-MM-DD` (midnight UTC) and `YYYY-MM-DD HH:MM` / `YYYY-MM-DDTHH:MM` (UTC)
//! - relative durations from now: `90s`, `15m`, `4h`, `3d`, `2w`, optionally
//!   written `+3d`

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Error, Result};

/// Parse a duration such as `30m` or `2w`. A bare number means days.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, "d"),
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: '{num_str}'")))?;

    let duration = match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::try_seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::try_minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::try_hours(num),
        "d" | "day" | "days" => Duration::try_days(num),
        "w" | "week" | "weeks" => Duration::try_weeks(num),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{unit}'. Expected: s, m, h, d, w"
            )));
        }
    };

    duration.ok_or_else(|| Error::InvalidArgument(format!("Duration out of range: '{s}'")))
}

/// Parse a point in time relative to `now`.
pub fn parse_when(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    match s.to_ascii_lowercase().as_str() {
        "" => return Err(Error::InvalidArgument("Time cannot be empty".to_string())),
        "now" => return Ok(now),
        "today" => return Ok(midnight(now.date_naive())),
        "tomorrow" => {
            let date = now.date_naive().succ_opt().unwrap_or(now.date_naive());
            return Ok(midnight(date));
        }
        _ => {}
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(at.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(midnight(date));
    }

    let relative = s.strip_prefix('+').unwrap_or(s);
    if relative.starts_with(|c: char| c.is_ascii_digit()) {
        let offset = parse_duration(relative)?;
        return now
            .checked_add_signed(offset)
            .ok_or_else(|| Error::InvalidArgument(format!("Time out of range: '{s}'")));
    }

    Err(Error::InvalidArgument(format!(
        "Invalid time '{s}'. Expected a date (YYYY-MM-DD), an RFC 3339 timestamp or a duration like 3d"
    )))
}

/// Parse a calendar date (due dates). Relative forms count from `today`.
pub fn parse_date(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    let at = parse_when(trimmed, midnight(today))?;
    Ok(at.date_naive())
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
