//! Rollout windows: one configured rule pairing days and times with a rate.

use crate::calendar::{parse_weekday, TimeOfDay, WeekdaySet};
use crate::error::{ParseErrors, WindowError};
use crate::rate::RateSpec;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One rollout window entry exactly as it appears in site configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawWindow {
    /// Weekday names; empty means every day.
    pub days: Vec<String>,
    /// `HH:MM`, or empty.
    pub start: String,
    /// `HH:MM`, or empty.
    pub end: String,
    /// `0`, `"unlimited"` or `"<count>/<unit>"`.
    pub rate: Value,
}

impl RawWindow {
    /// A raw window with only a rate set.
    pub fn with_rate(rate: impl Into<Value>) -> Self {
        Self {
            rate: rate.into(),
            ..Self::default()
        }
    }

    pub fn days<I, S>(mut self, days: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.days = days.into_iter().map(Into::into).collect();
        self
    }

    pub fn between(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = start.into();
        self.end = end.into();
        self
    }
}

/// A half-open `[start, end)` range within one day.
///
/// Ranges never wrap midnight: when `end <= start` nothing is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start <= time && time < self.end
    }
}

/// A parsed rollout window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    days: WeekdaySet,
    range: Option<TimeRange>,
    rate: RateSpec,
}

impl Window {
    pub fn new(days: WeekdaySet, range: Option<TimeRange>, rate: RateSpec) -> Self {
        Self { days, range, rate }
    }

    /// Parses a raw entry, collecting every field error rather than stopping
    /// at the first one.
    pub fn parse(raw: &RawWindow) -> Result<Self, ParseErrors> {
        let mut errors = Vec::new();

        let mut days = WeekdaySet::new();
        for day in &raw.days {
            match parse_weekday(day) {
                Ok(day) => days.insert(day),
                Err(e) => errors.push(e),
            }
        }

        let start = TimeOfDay::parse(&raw.start).unwrap_or_else(|e| {
            errors.push(e);
            None
        });
        let end = TimeOfDay::parse(&raw.end).unwrap_or_else(|e| {
            errors.push(e);
            None
        });
        if raw.start.is_empty() != raw.end.is_empty() {
            errors.push(WindowError::HalfOpenRange);
        }

        let rate = RateSpec::parse(&raw.rate);
        if let Err(e) = &rate {
            errors.push(e.clone());
        }

        if let Some(errors) = ParseErrors::collect(errors) {
            return Err(errors);
        }

        let range = match (start, end) {
            (Some(start), Some(end)) => Some(TimeRange { start, end }),
            _ => None,
        };
        // rate is Ok here: any Err was pushed above
        Ok(Self {
            days,
            range,
            rate: rate.unwrap_or(RateSpec::Unlimited),
        })
    }

    pub fn days(&self) -> WeekdaySet {
        self.days
    }

    pub fn range(&self) -> Option<TimeRange> {
        self.range
    }

    pub fn start(&self) -> Option<TimeOfDay> {
        self.range.map(|r| r.start)
    }

    pub fn end(&self) -> Option<TimeOfDay> {
        self.range.map(|r| r.end)
    }

    pub fn rate(&self) -> RateSpec {
        self.rate
    }

    /// Whether this window applies at `at` (UTC).
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        if !self.days.matches(at.weekday()) {
            return false;
        }
        match self.range {
            Some(range) => range.contains(TimeOfDay::from(at.time())),
            None => true,
        }
    }
}
