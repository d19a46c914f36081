//! Expiry durations with unit parsing and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// An explicit cache expiry window stored in whole seconds.
///
/// Zero means "no expiry": cached entries are judged by content validity
/// alone. Supports parsing from strings like "90s", "5m", "1h", "2d", and
/// bare numeric values (interpreted as seconds).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpiryDuration(u64);

impl ExpiryDuration {
    /// No explicit expiry.
    pub const NONE: ExpiryDuration = ExpiryDuration(0);

    /// Creates an expiry window of the given number of seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the window in seconds.
    pub fn secs(&self) -> u64 {
        self.0
    }

    /// Returns `true` if no expiry is configured.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Returns the window as a standard duration, or `None` when no expiry
    /// is configured.
    pub fn as_duration(&self) -> Option<std::time::Duration> {
        (!self.is_none()).then(|| std::time::Duration::from_secs(self.0))
    }
}

impl fmt::Debug for ExpiryDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpiryDuration({self})")
    }
}

impl fmt::Display for ExpiryDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0;
        if secs != 0 && secs % DAY == 0 {
            write!(f, "{}d", secs / DAY)
        } else if secs != 0 && secs % HOUR == 0 {
            write!(f, "{}h", secs / HOUR)
        } else if secs != 0 && secs % MINUTE == 0 {
            write!(f, "{}m", secs / MINUTE)
        } else {
            write!(f, "{secs}s")
        }
    }
}

/// Error type for parsing expiry strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseExpiryError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseExpiryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid expiry: '{}'", self.input)
    }
}

impl std::error::Error for ParseExpiryError {}

impl FromStr for ExpiryDuration {
    type Err = ParseExpiryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseExpiryError {
            input: s.to_string(),
        };

        let lower = s.to_ascii_lowercase();
        let (digits, scale) = if let Some(num) = lower.strip_suffix('d') {
            (num, DAY)
        } else if let Some(num) = lower.strip_suffix('h') {
            (num, HOUR)
        } else if let Some(num) = lower.strip_suffix('m') {
            (num, MINUTE)
        } else if let Some(num) = lower.strip_suffix('s') {
            (num, 1)
        } else {
            (lower.as_str(), 1)
        };

        let val: u64 = digits.trim().parse().map_err(|_| err())?;
        val.checked_mul(scale).map(ExpiryDuration).ok_or_else(err)
    }
}
