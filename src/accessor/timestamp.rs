//! Relaxed date/time grammar for timestamp settings.
//!
//! Accepts RFC 3339 and the common ISO-8601-like variants (space or `T`
//! separator, optional seconds and fractions, optional offset), plain
//! dates, a few spelled-out month forms, and two shorthand forms resolved
//! against "now": a bare 1-2 digit number is a day of the current month,
//! a bare 4 digit number is that year on the current month and day.
//! Anything else that still reads as a calendar date (RFC 2822, spelled
//! out times such as `May 8, 2009 5:57:51 PM`) goes through `dateparser`.
//! Values without an offset are taken as UTC.

use chrono::DateTime;
use chrono::Datelike;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Utc;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%b %d, %Y",
];

/// Parses `raw` into a UTC timestamp; `now` anchors the shorthand forms.
pub fn parse_timestamp(
    raw: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty timestamp".to_string());
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) && raw.len() <= 4 {
        return parse_shorthand(raw, now);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(midnight(date));
        }
    }

    // purely numeric values are never epoch seconds
    if raw.bytes().all(|b| b.is_ascii_digit() || b == b'.' || b == b'-') {
        return Err(format!("unrecognized date/time format: {:?}", raw));
    }
    dateparser::parse_with_timezone(raw, &Utc).map_err(|e| format!("unrecognized date/time format: {:?}: {}", raw, e))
}

/// Parses `raw` with a caller-supplied `strftime` format. The format may
/// carry an offset, a date and time, or a date only (midnight UTC).
pub fn parse_timestamp_with_format(
    raw: &str,
    format: &str,
) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_str(raw, format) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
        return Ok(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, format)
        .map(midnight)
        .map_err(|e| format!("does not match {:?}: {}", format, e))
}

fn parse_shorthand(
    digits: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, String> {
    let number: u32 = digits.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    let today = now.date_naive();

    let date = if digits.len() <= 2 {
        today.with_day(number)
    } else if digits.len() == 4 {
        today.with_year(number as i32)
    } else {
        None
    };

    date.map(midnight)
        .ok_or_else(|| format!("{} is out of range for the current date", digits))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}
