// libs/doctor-cell/src/services/schedule.rs
use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;
use tracing::debug;

use shared_config::ScheduleParseMode;

use crate::models::{Availability, ScheduleParseError};

const FRENCH_DAYS: [&str; 7] = ["lun", "mar", "mer", "jeu", "ven", "sam", "dim"];
const ENGLISH_DAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})-(\d{1,2}):(\d{2})").expect("time range pattern is valid")
});

static COMPACT_SCHEDULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<days>[^\d]+?)(?P<time>\d{1,2}:\d{2}-\d{1,2}:\d{2})")
        .expect("compact schedule pattern is valid")
});

/// Turns a doctor's weekly-hours text into an [`Availability`].
///
/// Accepted shapes:
/// - `"Lun-Ven 9:00-17:00"`, `"mon-fri 09:00-17:00"` (closed range)
/// - `"Ven-Lun 9:00-17:00"` (range wrapping over the weekend)
/// - `"lun,mer,ven 8:30-12:00"` (list; unknown items are skipped)
/// - `"samedi 10:00-14:00"` (tokens are matched on their first 3 letters)
///
/// In [`ScheduleParseMode::Tolerant`] spaces and `|` are ignored, so
/// `"Lun - Ven | 08:00 - 16:00"` parses too.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleParser {
    mode: ScheduleParseMode,
}

impl ScheduleParser {
    pub fn new(mode: ScheduleParseMode) -> Self {
        Self { mode }
    }

    /// Never panics; anything unusable comes back as a [`ScheduleParseError`].
    pub fn parse<'a>(&self, schedule: impl Into<Option<&'a str>>) -> Result<Availability, ScheduleParseError> {
        let text = schedule.into().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(ScheduleParseError::Empty);
        }

        let lowered = text.to_lowercase();
        let result = match self.mode {
            ScheduleParseMode::Standard => parse_standard(&lowered),
            ScheduleParseMode::Tolerant => parse_compact(&lowered),
        };

        if let Err(e) = &result {
            debug!("Unparsable schedule {:?} ({} mode): {}", text, self.mode, e);
        }
        result
    }
}

fn parse_standard(text: &str) -> Result<Availability, ScheduleParseError> {
    let mut fields = text.split_whitespace();
    let day_part = fields.next().ok_or(ScheduleParseError::Empty)?;
    let time_part = fields.next().ok_or(ScheduleParseError::MissingTimeRange)?;

    build(day_part, time_part)
}

fn parse_compact(text: &str) -> Result<Availability, ScheduleParseError> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '|')
        .collect();

    let caps = COMPACT_SCHEDULE
        .captures(&compact)
        .ok_or(ScheduleParseError::MissingTimeRange)?;
    let day_part = caps["days"].trim_end_matches(|c: char| matches!(c, '-' | ',' | ':' | ';'));

    build(day_part, &caps["time"])
}

fn build(day_part: &str, time_part: &str) -> Result<Availability, ScheduleParseError> {
    let days = parse_days(day_part)?;
    let (start, end) = parse_time_range(time_part)?;
    Ok(Availability::new(days, start, end))
}

fn parse_days(day_part: &str) -> Result<BTreeSet<u8>, ScheduleParseError> {
    if !day_part.contains(',') {
        return parse_day_item(day_part).map(|days| days.into_iter().collect());
    }

    let days: BTreeSet<u8> = day_part
        .split(',')
        .filter_map(|item| parse_day_item(item).ok())
        .flatten()
        .collect();

    if days.is_empty() {
        return Err(ScheduleParseError::NoDays(day_part.to_string()));
    }
    Ok(days)
}

fn parse_day_item(item: &str) -> Result<Vec<u8>, ScheduleParseError> {
    match item.split_once('-') {
        Some((_, to)) if to.contains('-') => Err(ScheduleParseError::UnknownDay(item.to_string())),
        Some((from, to)) => Ok(weekday_span(day_number(from)?, day_number(to)?)),
        None => Ok(vec![day_number(item)?]),
    }
}

fn day_number(token: &str) -> Result<u8, ScheduleParseError> {
    let key: String = token.trim().chars().take(3).collect();

    FRENCH_DAYS
        .iter()
        .position(|d| *d == key)
        .or_else(|| ENGLISH_DAYS.iter().position(|d| *d == key))
        .map(|i| i as u8)
        .ok_or_else(|| ScheduleParseError::UnknownDay(token.to_string()))
}

/// Closed range of weekday numbers, wrapping past Sunday when `from > to`.
fn weekday_span(from: u8, to: u8) -> Vec<u8> {
    if from <= to {
        (from..=to).collect()
    } else {
        (from..7).chain(0..=to).collect()
    }
}

fn parse_time_range(time_part: &str) -> Result<(NaiveTime, NaiveTime), ScheduleParseError> {
    let caps = TIME_RANGE
        .captures(time_part)
        .ok_or_else(|| ScheduleParseError::MalformedTimeRange(time_part.to_string()))?;

    let start = time_of_day(&caps[1], &caps[2])?;
    let end = time_of_day(&caps[3], &caps[4])?;
    Ok((start, end))
}

fn time_of_day(hour: &str, minute: &str) -> Result<NaiveTime, ScheduleParseError> {
    let invalid = || ScheduleParseError::InvalidTime(format!("{}:{}", hour, minute));

    let h: u32 = hour.parse().map_err(|_| invalid())?;
    let m: u32 = minute.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(h, m, 0).ok_or_else(invalid)
}
