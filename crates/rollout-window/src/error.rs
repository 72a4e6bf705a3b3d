//! Error types for rollout window parsing.

use std::fmt;
use thiserror::Error;

/// A single problem found while parsing one field of a raw window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// The weekday text does not start with a known three letter abbreviation.
    #[error("unknown weekday: {0:?}")]
    UnknownWeekday(String),

    /// The time of day is not of the form `HH:MM` within range.
    #[error("malformed time of day: {0:?}")]
    MalformedTime(String),

    /// The rate is neither `0`, `"unlimited"` nor `"<count>/<unit>"`.
    #[error("malformed rate: {0}")]
    MalformedRate(String),

    /// The unit after the slash does not start with `s`, `m` or `h`.
    #[error("malformed rate unit: {0:?}")]
    MalformedUnit(String),

    /// Exactly one of `start` and `end` was given.
    #[error("start and end must both be set or both be omitted")]
    HalfOpenRange,

    /// An error tagged with the position of the window it came from.
    #[error("window {index}: {error}")]
    Entry {
        index: usize,
        error: Box<WindowError>,
    },
}

impl WindowError {
    /// Tags this error with the index of the raw window it belongs to.
    pub fn at(self, index: usize) -> Self {
        Self::Entry {
            index,
            error: Box::new(self),
        }
    }

    /// Returns the untagged error.
    pub fn root(&self) -> &WindowError {
        match self {
            Self::Entry { error, .. } => error.root(),
            other => other,
        }
    }
}

/// Every error found in one raw window, or in one configuration push.
///
/// Never empty: parsing functions return `Ok` instead of an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseErrors {
    errors: Vec<WindowError>,
}

impl ParseErrors {
    /// Wraps collected errors, returning `None` when nothing went wrong.
    pub(crate) fn collect(errors: Vec<WindowError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[WindowError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<WindowError> {
        self.errors
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.errors.as_slice() {
            return write!(f, "1 error occurred: {only}");
        }
        write!(f, "{} errors occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\t* {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

impl IntoIterator for ParseErrors {
    type Item = WindowError;
    type IntoIter = std::vec::IntoIter<WindowError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_error_display() {
        let errs = ParseErrors::collect(vec![WindowError::HalfOpenRange]).unwrap();
        assert_eq!(
            errs.to_string(),
            "1 error occurred: start and end must both be set or both be omitted"
        );
    }

    #[test]
    fn test_multi_error_display_lists_every_error() {
        let errs = ParseErrors::collect(vec![
            WindowError::UnknownWeekday("xy".into()).at(0),
            WindowError::MalformedRate("-1/min".into()).at(2),
        ])
        .unwrap();
        let text = errs.to_string();
        assert!(text.starts_with("2 errors occurred:"));
        assert!(text.contains("window 0: unknown weekday: \"xy\""));
        assert!(text.contains("window 2: malformed rate: -1/min"));
    }

    #[test]
    fn test_empty_collect_is_none() {
        assert!(ParseErrors::collect(Vec::new()).is_none());
    }

    #[test]
    fn test_root_strips_tags() {
        let err = WindowError::HalfOpenRange.at(1).at(3);
        assert_eq!(err.root(), &WindowError::HalfOpenRange);
    }
}
