use std::{cmp::Ordering, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PrimaryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown vote direction {0:?}")]
pub struct UnknownDirection(pub String);

/// Weighted up and down totals of a single queue item.
/// Always derived from the vote rows, never stored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub up: u32,
    pub down: u32,
}

/// The key items are ordered by when deciding what plays next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankKey {
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub id: PrimaryKey,
}

impl Tally {
    /// Sums weighted ballots
    pub fn from_ballots<I>(ballots: I) -> Self
    where
        I: IntoIterator<Item = (VoteDirection, u32)>,
    {
        ballots
            .into_iter()
            .fold(Self::default(), |mut tally, (direction, weight)| {
                match direction {
                    VoteDirection::Up => tally.up = tally.up.saturating_add(weight),
                    VoteDirection::Down => tally.down = tally.down.saturating_add(weight),
                }
                tally
            })
    }

    pub fn score(&self) -> i64 {
        self.up as i64 - self.down as i64
    }

    /// Returns true if the item should be removed from the queue immediately.
    /// Down must strictly outweigh up, so an untouched item never qualifies.
    pub fn vetoes(&self) -> bool {
        self.down > self.up && self.down > 0
    }
}

impl Ord for RankKey {
    /// Higher score first, then first submitted, then lowest id
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl FromStr for VoteDirection {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

impl Display for VoteDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
