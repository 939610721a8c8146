//! Retention policy parsing
//!
//! A retention expression is `<integer><unit>`:
//! - `h`, `d`, `w`, `m`, `y` keep artifacts younger than the given age.
//!   Months and years use fixed multipliers (30 and 365 days), never
//!   calendar arithmetic.
//! - `c` keeps the given number of most recent artifacts.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const HOURS_PER_DAY: u64 = 24;
const HOURS_PER_WEEK: u64 = 7 * HOURS_PER_DAY;
const HOURS_PER_MONTH: u64 = 30 * HOURS_PER_DAY;
const HOURS_PER_YEAR: u64 = 365 * HOURS_PER_DAY;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetentionError {
    #[error("invalid format: {0}")]
    InvalidRetentionFormat(String),
}

/// Which artifacts survive a prune run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep artifacts whose age does not exceed this many hours
    Duration { hours: u64 },
    /// Keep this many of the most recent artifacts
    Count { keep: usize },
}

impl Retention {
    /// Parse a retention expression such as `7d` or `10c`
    pub fn parse(input: &str) -> Result<Self, RetentionError> {
        let invalid = || RetentionError::InvalidRetentionFormat(input.to_string());

        let unit = input.chars().last().ok_or_else(invalid)?;
        let digits = &input[..input.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        if unit == 'c' {
            // Only overflow can fail past the digit check
            let keep = digits.parse::<usize>().unwrap_or(usize::MAX);
            return Ok(Retention::Count { keep });
        }

        let multiplier = match unit {
            'h' => 1,
            'd' => HOURS_PER_DAY,
            'w' => HOURS_PER_WEEK,
            'm' => HOURS_PER_MONTH,
            'y' => HOURS_PER_YEAR,
            _ => return Err(invalid()),
        };

        let hours = digits
            .parse::<u64>()
            .unwrap_or(u64::MAX)
            .saturating_mul(multiplier);

        Ok(Retention::Duration { hours })
    }
}

impl FromStr for Retention {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Duration { hours } => write!(f, "{}h", hours),
            Retention::Count { keep } => write!(f, "{}c", keep),
        }
    }
}
