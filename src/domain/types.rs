use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::error::DomainError;

/// Kind of destructive change an undo entry reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoAction {
    Delete,
    Update,
    StatusChange,
}

impl UndoAction {
    pub fn as_str(self) -> &'static str {
        match self {
            UndoAction::Delete => "delete",
            UndoAction::Update => "update",
            UndoAction::StatusChange => "status_change",
        }
    }
}

impl fmt::Display for UndoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UndoAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "delete" => Ok(UndoAction::Delete),
            "update" => Ok(UndoAction::Update),
            "status_change" => Ok(UndoAction::StatusChange),
            other => Err(DomainError::validation(format!(
                "unknown undo action `{other}`"
            ))),
        }
    }
}

/// How a restore treats changes recorded after its snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Restore unconditionally; intervening state is overwritten.
    #[default]
    LastWriteWins,
    /// Refuse to restore while a newer undo entry exists for the same entity.
    RejectNewer,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictPolicy::LastWriteWins => "last_write_wins",
            ConflictPolicy::RejectNewer => "reject_newer",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "last_write_wins" => Ok(ConflictPolicy::LastWriteWins),
            "reject_newer" => Ok(ConflictPolicy::RejectNewer),
            other => Err(DomainError::validation(format!(
                "unknown conflict policy `{other}` (expected last_write_wins or reject_newer)"
            ))),
        }
    }
}

/// Authenticated identity of the caller, as supplied by the surrounding session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Timestamps are persisted as Unix milliseconds so SQL comparisons stay numeric.
pub fn to_unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_unix_millis(millis: i64) -> Result<OffsetDateTime, DomainError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| DomainError::invariant(format!("timestamp {millis} out of range: {err}")))
}

/// Drop sub-millisecond precision so in-memory values match what is stored.
pub fn truncate_to_millis(at: OffsetDateTime) -> OffsetDateTime {
    let millis = at.millisecond();
    at.replace_millisecond(millis).unwrap_or(at)
}
