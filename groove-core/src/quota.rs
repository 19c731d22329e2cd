use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::{Limit, TierLimits};

/// The kinds of actions that are counted per user per day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CounterKind {
    Requests,
    Votes,
    RoomsCreated,
}

/// A user's counters for a single UTC day.
/// A missing row is the same as all zeroes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub request_count: u32,
    pub vote_count: u32,
    pub rooms_created_count: u32,
}

/// The outcome of checking and incrementing a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The counter was incremented, `used` includes this action
    Allowed { used: u32, limit: Limit },
    /// Nothing was incremented
    Denied { used: u32, limit: u32 },
}

impl CounterKind {
    /// Returns the limit that applies to this counter
    pub fn limit(&self, limits: &TierLimits) -> Limit {
        match self {
            CounterKind::Requests => limits.daily_requests,
            CounterKind::Votes => limits.daily_votes,
            CounterKind::RoomsCreated => limits.daily_rooms,
        }
    }

    /// The column storing this counter
    pub fn column(&self) -> &'static str {
        match self {
            CounterKind::Requests => "song_requests",
            CounterKind::Votes => "votes_cast",
            CounterKind::RoomsCreated => "rooms_created",
        }
    }
}

impl Usage {
    pub fn get(&self, kind: CounterKind) -> u32 {
        match kind {
            CounterKind::Requests => self.request_count,
            CounterKind::Votes => self.vote_count,
            CounterKind::RoomsCreated => self.rooms_created_count,
        }
    }

    pub fn get_mut(&mut self, kind: CounterKind) -> &mut u32 {
        match kind {
            CounterKind::Requests => &mut self.request_count,
            CounterKind::Votes => &mut self.vote_count,
            CounterKind::RoomsCreated => &mut self.rooms_created_count,
        }
    }
}

impl QuotaDecision {
    /// Decides whether one more action fits within the limit, given current usage
    pub fn evaluate(limit: Limit, used: u32) -> Self {
        match limit {
            Limit::Max(max) if used >= max => Self::Denied { used, limit: max },
            limit => Self::Allowed {
                used: used.saturating_add(1),
                limit,
            },
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// The calendar day (UTC) a counter belongs to.
/// Quotas reset implicitly because the day is part of the key.
pub fn usage_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

impl Display for CounterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CounterKind::Requests => "song requests",
            CounterKind::Votes => "votes",
            CounterKind::RoomsCreated => "rooms created",
        };

        f.write_str(name)
    }
}
