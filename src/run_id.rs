//! Run identity: one timestamp-sortable token per workflow execution.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of one run, formatted `YYYYMMDD-HHMMSS-NNNNN`.
///
/// The random suffix avoids collisions between runs started in the same
/// second; lexicographic order follows start time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Generates a new identifier for the current UTC time.
    pub fn generate() -> Self {
        Self::at(Utc::now(), random_suffix())
    }

    /// Builds an identifier from an explicit timestamp and suffix.
    pub fn at(time: DateTime<Utc>, suffix: u32) -> Self {
        RunId(format!(
            "{}-{:05}",
            time.format("%Y%m%d-%H%M%S"),
            suffix % 100_000
        ))
    }

    /// Validates an existing identifier.
    pub fn parse(value: &str) -> Result<Self> {
        if is_run_id(value) {
            Ok(RunId(value.to_string()))
        } else {
            Err(Error::parse(format!(
                "invalid run id '{}': expected YYYYMMDD-HHMMSS-NNNNN",
                value
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn random_suffix() -> u32 {
    (uuid::Uuid::new_v4().as_u128() % 100_000) as u32
}

fn is_run_id(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    matches!(parts.as_slice(), [date, time, suffix]
        if date.len() == 8 && time.len() == 6 && suffix.len() == 5
            && [date, time, suffix]
                .iter()
                .all(|part| part.bytes().all(|b| b.is_ascii_digit())))
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RunId::parse(s)
    }
}

impl TryFrom<String> for RunId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        RunId::parse(&value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}
