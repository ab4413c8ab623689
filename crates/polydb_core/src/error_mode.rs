//! Error propagation policy for batch and stream operations.

use crate::error::DbError;
use std::fmt;
use std::str::FromStr;

/// How a batch or stream operation reacts to a failing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Abort on the first error. Results already emitted stay valid.
    #[default]
    ThrowImmediately,
    /// Keep going, then fail with one [`DbError::Aggregate`] listing every
    /// error.
    ThrowAggregated,
    /// Log and drop failing items; never fail.
    Suppress,
}

impl ErrorMode {
    /// Converts collected errors into the outcome this mode prescribes.
    ///
    /// `ThrowImmediately` returns the first error, `ThrowAggregated` wraps
    /// all of them, `Suppress` always succeeds.
    pub fn finish(self, mut errors: Vec<DbError>) -> Result<(), DbError> {
        if errors.is_empty() {
            return Ok(());
        }
        match self {
            Self::Suppress => Ok(()),
            Self::ThrowImmediately => Err(errors.swap_remove(0)),
            Self::ThrowAggregated => Err(DbError::Aggregate { errors }),
        }
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ThrowImmediately => "throw-immediately",
            Self::ThrowAggregated => "throw-aggregated",
            Self::Suppress => "suppress",
        })
    }
}

impl FromStr for ErrorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "throw-immediately" => Ok(Self::ThrowImmediately),
            "throw-aggregated" => Ok(Self::ThrowAggregated),
            "suppress" => Ok(Self::Suppress),
            other => Err(format!("unknown error mode: {other}")),
        }
    }
}
