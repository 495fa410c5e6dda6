use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

/// The pickup timestamp could not be read as an ISO-8601 date/time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pickup timestamp {value:?}: expected an ISO-8601 date/time such as 2020-02-01T08:30:00Z")]
pub struct TimestampParseError {
    pub value: String,
}

/// Calendar parts of a pickup time that the model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickupTime {
    /// 0..=23
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday
    pub weekday: u32,
    /// 1..=12
    pub month: u32,
    pub is_weekend: bool,
}

impl PickupTime {
    /// Parse a pickup timestamp.
    ///
    /// Every `Z` is dropped and `T` becomes a space before parsing, so
    /// `2020-02-01T08:30:00Z`, `2020-02-01 08:30:00` and `2020-02-01T08:30`
    /// all read the same. Dates are `YYYY-MM-DD`, `YYYYMMDD` or an ISO week
    /// date; times are `HH`, `HH:MM`, `HH:MM:SS` or their basic forms, with
    /// optional fractional seconds. Every field is zero padded. A bare date
    /// means midnight. A trailing `±HH[:MM[:SS]]` offset is validated and
    /// ignored: the wall-clock fields are taken as written.
    pub fn parse(raw: &str) -> Result<Self, TimestampParseError> {
        let cleaned = raw.replace('Z', "").replace('T', " ");
        let cleaned = cleaned.trim();

        parse_local(cleaned)
            .map(Self::from_datetime)
            .ok_or_else(|| TimestampParseError { value: raw.to_string() })
    }

    fn from_datetime(dt: NaiveDateTime) -> Self {
        let weekday = dt.weekday().num_days_from_monday();
        Self {
            hour: dt.hour(),
            weekday,
            month: dt.month(),
            is_weekend: weekday >= 5,
        }
    }

    pub fn hour_sin(&self) -> f64 {
        (2.0 * PI * self.hour as f64 / 24.0).sin()
    }

    pub fn hour_cos(&self) -> f64 {
        (2.0 * PI * self.hour as f64 / 24.0).cos()
    }
}

fn parse_local(s: &str) -> Option<NaiveDateTime> {
    let (date, time) = match s.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (s, None),
    };
    let date = parse_date(date)?;
    let time = match time {
        Some(time) => parse_time_with_offset(time)?,
        None => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

/// Digits become `d`, everything else is kept, so `2020-02-01` has shape
/// `dddd-dd-dd`. Any non-ASCII input fails every shape match below.
fn shape(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_digit() { 'd' } else { c }).collect()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let (text, fmt) = match shape(s).as_str() {
        "dddd-dd-dd" => (s.to_string(), "%Y-%m-%d"),
        "dddddddd" => (format!("{}-{}-{}", &s[..4], &s[4..6], &s[6..]), "%Y-%m-%d"),
        "dddd-Wdd-d" => (s.to_string(), "%G-W%V-%u"),
        "dddd-Wdd" => (format!("{}-1", s), "%G-W%V-%u"),
        "ddddWddd" => (format!("{}-W{}-{}", &s[..4], &s[5..7], &s[7..]), "%G-W%V-%u"),
        "ddddWdd" => (format!("{}-W{}-1", &s[..4], &s[5..]), "%G-W%V-%u"),
        _ => return None,
    };
    NaiveDate::parse_from_str(&text, fmt).ok()
}

fn parse_time_with_offset(s: &str) -> Option<NaiveTime> {
    let (clock, offset) = match s.find(|c: char| c == '+' || c == '-') {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };
    let time = parse_clock(clock)?;
    // an offset has the grammar of a time of day below 24h
    if let Some(offset) = offset {
        parse_clock(offset)?;
    }
    Some(time)
}

fn parse_clock(s: &str) -> Option<NaiveTime> {
    let (main, fraction) = match s.find(|c: char| c == '.' || c == ',') {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };

    let (hms, has_seconds) = match shape(main).as_str() {
        "dd" => (format!("{}:00:00", main), false),
        "dd:dd" => (format!("{}:00", main), false),
        "dddd" => (format!("{}:{}:00", &main[..2], &main[2..]), false),
        "dd:dd:dd" => (main.to_string(), true),
        "dddddd" => (format!("{}:{}:{}", &main[..2], &main[2..4], &main[4..]), true),
        _ => return None,
    };

    let text = match fraction {
        None => hms,
        Some(f) if has_seconds && !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}.{}", hms, &f[..f.len().min(9)])
        }
        Some(_) => return None,
    };

    // chrono reads second 60 as a leap second; ISO clocks stop at 59
    NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
        .ok()
        .filter(|t| t.nanosecond() < 1_000_000_000)
}
