//! Calendar primitives: time of day and weekday sets.

use crate::error::WindowError;
use chrono::{NaiveTime, Timelike, Weekday};
use std::fmt;

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("mon", Weekday::Mon),
    ("tue", Weekday::Tue),
    ("wed", Weekday::Wed),
    ("thu", Weekday::Thu),
    ("fri", Weekday::Fri),
    ("sat", Weekday::Sat),
    ("sun", Weekday::Sun),
];

/// Parses a weekday from its first three letters, ignoring case.
///
/// `"Mon"`, `"MONDAY"` and `"monday"` are all Monday. Anything shorter than
/// three characters is rejected.
pub fn parse_weekday(raw: &str) -> Result<Weekday, WindowError> {
    let prefix: String = raw.chars().take(3).flat_map(char::to_lowercase).collect();
    WEEKDAYS
        .iter()
        .find(|(abbrev, _)| *abbrev == prefix)
        .map(|(_, day)| *day)
        .ok_or_else(|| WindowError::UnknownWeekday(raw.to_string()))
}

/// A wall-clock time of day with minute resolution.
///
/// Ordered by minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self { minutes: 0 };

    /// Returns `None` unless `hour < 24` and `minute < 60`.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self {
            minutes: (hour * 60 + minute) as u16,
        })
    }

    /// Parses `HH:MM`. The empty string is valid and means "not set".
    pub fn parse(raw: &str) -> Result<Option<Self>, WindowError> {
        if raw.is_empty() {
            return Ok(None);
        }

        let malformed = || WindowError::MalformedTime(raw.to_string());
        let mut parts = raw.split(':');
        let (Some(hour), Some(minute), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed());
        };
        let hour: u32 = hour.parse().map_err(|_| malformed())?;
        let minute: u32 = minute.parse().map_err(|_| malformed())?;

        Self::new(hour, minute).map(Some).ok_or_else(malformed)
    }

    pub fn hour(self) -> u32 {
        u32::from(self.minutes / 60)
    }

    pub fn minute(self) -> u32 {
        u32::from(self.minutes % 60)
    }

    pub fn minutes_since_midnight(self) -> u32 {
        u32::from(self.minutes)
    }

    /// The same instant as a [`NaiveTime`] at zero seconds.
    pub fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }
}

impl From<NaiveTime> for TimeOfDay {
    /// Truncates seconds and below.
    fn from(time: NaiveTime) -> Self {
        Self {
            minutes: (time.hour() * 60 + time.minute()) as u16,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// A set of weekdays stored as a 7-bit mask.
///
/// The empty set matches every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WeekdaySet {
    bits: u8,
}

impl WeekdaySet {
    /// The empty set, which matches every day.
    pub const EVERY_DAY: Self = Self { bits: 0 };

    pub fn new() -> Self {
        Self::default()
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn insert(&mut self, day: Weekday) {
        self.bits |= Self::bit(day);
    }

    pub fn with(mut self, day: Weekday) -> Self {
        self.insert(day);
        self
    }

    /// Returns `true` if `day` is in the set, or if the set is empty.
    pub fn matches(self, day: Weekday) -> bool {
        self.bits == 0 || self.bits & Self::bit(day) != 0
    }

    /// Strict membership, without the empty-set rule.
    pub fn contains(self, day: Weekday) -> bool {
        self.bits & Self::bit(day) != 0
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn len(self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Days explicitly in the set, Monday first.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        WEEKDAYS
            .iter()
            .map(|(_, day)| *day)
            .filter(move |day| self.contains(*day))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::new();
        for day in iter {
            set.insert(day);
        }
        set
    }
}
