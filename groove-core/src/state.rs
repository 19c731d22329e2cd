use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Where a queue item is in its lifecycle. `Played` is terminal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum QueueItemState {
    #[default]
    Queued,
    Played {
        at: DateTime<Utc>,
        cause: PlayedCause,
    },
}

/// What took an item out of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayedCause {
    /// The host advanced playback to it
    Advanced,
    /// Down votes outweighed up votes
    Vetoed,
    /// Enough members voted to skip it while it was playing
    Skipped,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown played cause {0:?}")]
pub struct UnknownCause(pub String);

impl QueueItemState {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }

    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Queued => None,
            Self::Played { at, .. } => Some(*at),
        }
    }

    pub fn cause(&self) -> Option<PlayedCause> {
        match self {
            Self::Queued => None,
            Self::Played { cause, .. } => Some(*cause),
        }
    }

    /// Rebuilds the state from its stored columns
    pub fn from_columns(played_at: Option<DateTime<Utc>>, cause: Option<PlayedCause>) -> Self {
        match played_at {
            None => Self::Queued,
            Some(at) => Self::Played {
                at,
                cause: cause.unwrap_or(PlayedCause::Advanced),
            },
        }
    }
}

impl PlayedCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayedCause::Advanced => "advanced",
            PlayedCause::Vetoed => "vetoed",
            PlayedCause::Skipped => "skipped",
        }
    }
}

impl FromStr for PlayedCause {
    type Err = UnknownCause;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advanced" => Ok(PlayedCause::Advanced),
            "vetoed" => Ok(PlayedCause::Vetoed),
            "skipped" => Ok(PlayedCause::Skipped),
            other => Err(UnknownCause(other.to_string())),
        }
    }
}

impl Display for PlayedCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
