// libs/schedule-cell/src/services/time.rs
//
// Minute-of-day arithmetic. Everything downstream compares plain minutes;
// "HH:MM" strings only exist at the serde boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid time format: '{0}' (expected HH:MM)")]
    InvalidTimeFormat(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),
}

/// A wall-clock time of day, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: u32) -> Result<Self, TimeError> {
        if minutes >= MINUTES_PER_DAY {
            return Err(TimeError::InvalidTimeFormat(format!("{} minutes", minutes)));
        }
        Ok(Self(minutes as u16))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Result<Self, TimeError> {
        if hour > 23 || minute > 59 {
            return Err(TimeError::InvalidTimeFormat(format!("{}:{}", hour, minute)));
        }
        Ok(Self((hour * 60 + minute) as u16))
    }

    pub fn minutes(self) -> u32 {
        self.0 as u32
    }
}

impl FromStr for ClockTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        to_minutes(s).map(|m| Self(m as u16))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse "HH:MM" (hour may be one digit). Postgres `time` columns come back as
/// "HH:MM:SS", so a trailing seconds field is accepted and dropped.
pub fn to_minutes(hhmm: &str) -> Result<u32, TimeError> {
    let invalid = || TimeError::InvalidTimeFormat(hhmm.to_string());

    let mut parts = hhmm.trim().split(':');
    let hour = parts.next().ok_or_else(invalid)?;
    let minute = parts.next().ok_or_else(invalid)?;
    let second = parts.next();
    if parts.next().is_some() {
        return Err(invalid());
    }

    let numeric = |s: &str, min_len: usize| {
        (min_len..=2).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !numeric(hour, 1) || !numeric(minute, 2) {
        return Err(invalid());
    }
    if let Some(sec) = second {
        if !numeric(sec, 2) || sec.parse::<u32>().map_err(|_| invalid())? > 59 {
            return Err(invalid());
        }
    }

    let h: u32 = hour.parse().map_err(|_| invalid())?;
    let m: u32 = minute.parse().map_err(|_| invalid())?;
    if h > 23 || m > 59 {
        return Err(invalid());
    }

    Ok(h * 60 + m)
}

pub fn to_hhmm(minutes: u32) -> Result<String, TimeError> {
    ClockTime::from_minutes(minutes).map(|t| t.to_string())
}

/// Half-open overlap: `[a_start, a_end)` and `[b_start, b_end)` share at least one minute.
/// Touching endpoints do not overlap, which is what lets slots sit back to back.
pub fn overlaps(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < a_end && b_start < b_end && a_start < b_end && b_start < a_end
}

/// Half-open minute range. `end` may run past midnight for appointments that do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: ClockTime, duration_minutes: u32) -> Self {
        Self::new(start.minutes(), start.minutes() + duration_minutes)
    }

    pub fn between(start: ClockTime, end: ClockTime) -> Self {
        Self::new(start.minutes(), end.minutes())
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// `other` lies entirely inside `self`.
    pub fn contains(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// Merge sorted overlapping/adjacent ranges into disjoint ones.
pub fn merge_overlapping(sorted: &[TimeRange]) -> Vec<TimeRange> {
    let mut merged: Vec<TimeRange> = Vec::new();
    for &range in sorted {
        if range.is_empty() {
            continue;
        }
        if let Some(last) = merged.last_mut() {
            if range.start <= last.end {
                last.end = last.end.max(range.end);
                continue;
            }
        }
        merged.push(range);
    }
    merged
}
