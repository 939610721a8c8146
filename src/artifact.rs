//! Backup artifact naming
//!
//! Every dump is stored as `db_backup_<timestamp>.<ext>`. The timestamp in the
//! name, not the file's modification time, is what pruning relies on, so it
//! survives copies between targets.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const ARTIFACT_PREFIX: &str = "db_backup_";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn artifact_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^db_backup_([^.]+)\.([A-Za-z0-9]+(?:\.[A-Za-z0-9]+)*)$")
            .expect("artifact pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("'{0}' does not match the backup filename pattern")]
    NoMatch(String),

    #[error("'{name}' has an unparsable timestamp '{timestamp}'")]
    BadTimestamp { name: String, timestamp: String },
}

/// A backup file found at a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub extension: String,
}

impl Artifact {
    /// Recognise a backup filename and extract its embedded timestamp
    pub fn parse(name: &str) -> Result<Self, ArtifactError> {
        let captures = artifact_pattern()
            .captures(name)
            .ok_or_else(|| ArtifactError::NoMatch(name.to_string()))?;

        let raw = &captures[1];
        let timestamp = parse_timestamp(raw).ok_or_else(|| ArtifactError::BadTimestamp {
            name: name.to_string(),
            timestamp: raw.to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            timestamp,
            extension: captures[2].to_string(),
        })
    }

    /// Age of the artifact relative to `reference`
    pub fn age(&self, reference: DateTime<Utc>) -> chrono::Duration {
        reference - self.timestamp
    }
}

/// Build the artifact filename for a dump taken at `now`
///
/// With `safechars` every `:` becomes `-`, for filesystems and shells that
/// reject colons.
pub fn artifact_name(now: DateTime<Utc>, extension: &str, safechars: bool) -> String {
    let mut timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    if safechars {
        timestamp = timestamp.replace(':', "-");
    }
    format!("{}{}.{}", ARTIFACT_PREFIX, timestamp, extension)
}

/// Parse an RFC3339-like timestamp, accepting the safechars variant where the
/// time separators are hyphens.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let (date, time) = raw.split_once('T')?;

    // Only the first two hyphens of the time part are separators; a later one
    // belongs to a negative UTC offset.
    let mut normalized = String::with_capacity(raw.len());
    normalized.push_str(date);
    normalized.push('T');
    let mut replaced = 0;
    for c in time.chars() {
        if c == '-' && replaced < 2 {
            normalized.push(':');
            replaced += 1;
        } else {
            normalized.push(c);
        }
    }

    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
