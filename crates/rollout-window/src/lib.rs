//! Rollout Windows
//!
//! Calendar and rate model for time-windowed dispatch. A site configures an
//! ordered list of rollout windows, each pairing a set of weekdays and an
//! optional time-of-day range with a dispatch rate:
//!
//! ```json
//! [
//!   { "rate": "10/hour" },
//!   { "days": ["sat", "sun"], "start": "01:00", "end": "05:00", "rate": "unlimited" },
//!   { "days": ["fri"], "rate": 0 }
//! ]
//! ```
//!
//! The last window matching an instant wins, so a default rate listed first is
//! overridden by more specific windows listed after it. An instant no window
//! matches is unrestricted.
//!
//! All times are UTC. Time ranges are half-open (`[start, end)`) and do not
//! wrap midnight: a window from `22:00` to `02:00` is never active and must be
//! written as two windows.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use rollout_window::{Configuration, RateSpec, RawWindow};
//!
//! let raw = vec![
//!     RawWindow::with_rate("20/hr").days(["mon"]).between("01:15", "02:30"),
//! ];
//! let (cfg, result) = Configuration::from_raw(Some(&raw));
//! assert!(result.is_ok());
//!
//! let monday = Utc.with_ymd_and_hms(2024, 1, 1, 1, 30, 0).unwrap();
//! assert_eq!(cfg.current(monday).map(|w| w.rate().to_string()), Some("20/hour".into()));
//! assert_eq!(cfg.active(monday + chrono::Duration::hours(2)).rate, RateSpec::Unlimited);
//! ```

mod calendar;
mod configuration;
mod error;
mod rate;
mod window;

pub use calendar::{parse_weekday, TimeOfDay, WeekdaySet};
pub use configuration::{log_parse_errors, ActiveRate, Configuration};
pub use error::{ParseErrors, WindowError};
pub use rate::{RateSpec, RateUnit};
pub use window::{RawWindow, TimeRange, Window};

// Re-exported so callers can name weekdays and instants without a direct
// chrono dependency.
pub use chrono::{DateTime, Utc, Weekday};
