//! Dispatch rates.
//!
//! A rate is written in site configuration as either the integer `0`
//! (nothing may be dispatched), the string `"unlimited"`, or a string of the
//! form `"<count>/<unit>"` such as `"20/hr"` or `"5/minute"`.
//!
//! [`RateUnit`] is only ever produced by [`RateSpec::parse`] or by naming one
//! of its three variants, so converting a unit to a [`Duration`] is total.

use crate::error::WindowError;
use serde_json::Value;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

/// The period a [`RateSpec::Limited`] count applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
}

impl RateUnit {
    /// Resolves a unit token by its first character only, ignoring case.
    fn parse(raw: &str) -> Result<Self, WindowError> {
        match raw.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('s') => Ok(Self::Second),
            Some('m') => Ok(Self::Minute),
            Some('h') => Ok(Self::Hour),
            _ => Err(WindowError::MalformedUnit(raw.to_string())),
        }
    }

    pub const fn as_duration(self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::Minute => Duration::from_secs(60),
            Self::Hour => HOUR,
        }
    }

    /// How many of this unit fit in one hour. Always exact.
    pub const fn per_hour(self) -> u64 {
        match self {
            Self::Second => 3600,
            Self::Minute => 60,
            Self::Hour => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
        }
    }
}

/// A parsed dispatch rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateSpec {
    /// Nothing is dispatched while this rate applies.
    Blocked,
    /// No pacing at all.
    Unlimited,
    /// At most `count` dispatches per `unit`.
    Limited { count: NonZeroU32, unit: RateUnit },
}

impl RateSpec {
    /// Parses a raw JSON rate value.
    ///
    /// Only the integer `0` and strings are accepted; any other number, and
    /// any other JSON type, is a malformed rate.
    pub fn parse(raw: &Value) -> Result<Self, WindowError> {
        match raw {
            Value::Number(n) if n.as_u64() == Some(0) => Ok(Self::Blocked),
            Value::String(s) => Self::parse_str(s),
            other => Err(WindowError::MalformedRate(other.to_string())),
        }
    }

    /// Parses the string form of a rate.
    pub fn parse_str(raw: &str) -> Result<Self, WindowError> {
        if raw.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }

        let malformed = || WindowError::MalformedRate(format!("{raw:?}"));
        let (count, unit) = raw.split_once('/').ok_or_else(malformed)?;
        if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let count: u32 = count.parse().map_err(|_| malformed())?;
        let unit = RateUnit::parse(unit)?;

        Ok(match NonZeroU32::new(count) {
            Some(count) => Self::Limited { count, unit },
            None => Self::Blocked,
        })
    }

    /// Convenience constructor; a zero count yields [`RateSpec::Blocked`].
    pub fn limited(count: u32, unit: RateUnit) -> Self {
        match NonZeroU32::new(count) {
            Some(count) => Self::Limited { count, unit },
            None => Self::Blocked,
        }
    }

    /// Minimum spacing between two dispatches, `None` unless limited.
    pub fn spacing(&self) -> Option<Duration> {
        match *self {
            Self::Limited { count, unit } => Some(unit.as_duration() / count.get()),
            _ => None,
        }
    }

    /// Dispatches allowed per hour, `None` unless limited.
    pub fn per_hour(&self) -> Option<u64> {
        match *self {
            Self::Limited { count, unit } => Some(u64::from(count.get()) * unit.per_hour()),
            _ => None,
        }
    }

    /// Estimates how many dispatches fit into `duration`.
    ///
    /// Returns `-1` for unlimited and `0` for blocked. Advisory only.
    pub fn events_over(&self, duration: Duration) -> i64 {
        match self {
            Self::Blocked => 0,
            Self::Unlimited => -1,
            Self::Limited { .. } => {
                let per_hour = self.per_hour().unwrap_or(0) as u128;
                let total = per_hour * duration.as_nanos() / HOUR.as_nanos();
                i64::try_from(total).unwrap_or(i64::MAX)
            }
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => f.write_str("0"),
            Self::Unlimited => f.write_str("unlimited"),
            Self::Limited { count, unit } => write!(f, "{}/{}", count, unit.name()),
        }
    }
}
