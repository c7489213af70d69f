//! Error types for each component boundary.
//!
//! Hand-written `Display`/`Error` impls, no `thiserror` — this crate's
//! dependency tree never reaches for it.

use std::fmt;

/// A Common Log Format line failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A space- or bracket-delimited field was missing its delimiter.
    MissingDelimiter { field: &'static str },
    /// The bracketed timestamp did not match `%d/%b/%Y:%H:%M:%S %z`.
    BadTimestamp { raw: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingDelimiter { field } => {
                write!(f, "wrong format: missing delimiter after field '{field}'")
            }
            ParseError::BadTimestamp { raw } => {
                write!(f, "time.Parse: could not parse timestamp '{raw}'")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Reading from the tailed log source failed for a reason other than
/// end-of-stream.
#[derive(Debug)]
pub enum TailError {
    Io(std::io::Error),
}

impl fmt::Display for TailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TailError::Io(e) => write!(f, "read error: {e}"),
        }
    }
}

impl std::error::Error for TailError {}

impl From<std::io::Error> for TailError {
    fn from(e: std::io::Error) -> Self {
        TailError::Io(e)
    }
}

/// A `Config` value failed startup validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `MetricsFrequency` is not a positive integer multiple of `ReadFrequency`.
    MetricsFrequencyNotMultiple,
    /// `Delay` is not strictly less than `ReadFrequency`.
    DelayNotSmallerThanReadFrequency,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MetricsFrequencyNotMultiple => {
                write!(f, "MetricsFrequency should be a multiple of ReadFrequency")
            }
            ConfigError::DelayNotSmallerThanReadFrequency => {
                write!(f, "Delay must be smaller than ReadFrequency")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
