use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A service level, controlling quotas, capabilities, and vote weight.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    #[serde(alias = "dj_pro")]
    Pro,
    Venue,
}

/// A ceiling on a counted action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "max")]
pub enum Limit {
    Unlimited,
    Max(u32),
}

/// Everything a tier allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimits {
    /// How many tracks can be added to queues per day
    pub daily_requests: Limit,
    pub daily_votes: Limit,
    pub daily_rooms: Limit,
    /// The biggest room this tier can join into
    pub max_room_size: u32,
    /// Only applied when `priority_voting` is true
    pub vote_weight: u32,
    pub priority_voting: bool,
    pub can_create_groups: bool,
    pub can_direct_message: bool,
    pub max_friends: Limit,
    pub dj_controls: bool,
    pub analytics: bool,
    pub multi_room: bool,
    pub branding: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown tier {0:?}")]
pub struct UnknownTier(pub String);

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Premium, Tier::Pro, Tier::Venue];

    /// Returns the limits of this tier
    pub fn limits(&self) -> TierLimits {
        match self {
            Tier::Free => TierLimits {
                daily_requests: Limit::Max(5),
                daily_votes: Limit::Unlimited,
                daily_rooms: Limit::Unlimited,
                max_room_size: 8,
                vote_weight: 1,
                priority_voting: false,
                can_create_groups: false,
                can_direct_message: true,
                max_friends: Limit::Max(20),
                dj_controls: false,
                analytics: false,
                multi_room: false,
                branding: false,
            },
            Tier::Premium => TierLimits {
                daily_requests: Limit::Max(50),
                daily_votes: Limit::Unlimited,
                daily_rooms: Limit::Unlimited,
                max_room_size: 50,
                vote_weight: 2,
                priority_voting: true,
                can_create_groups: true,
                can_direct_message: true,
                max_friends: Limit::Max(200),
                dj_controls: false,
                analytics: false,
                multi_room: false,
                branding: false,
            },
            Tier::Pro => TierLimits {
                daily_requests: Limit::Unlimited,
                daily_votes: Limit::Unlimited,
                daily_rooms: Limit::Unlimited,
                max_room_size: 200,
                vote_weight: 3,
                priority_voting: true,
                can_create_groups: true,
                can_direct_message: true,
                max_friends: Limit::Unlimited,
                dj_controls: true,
                analytics: true,
                multi_room: false,
                branding: false,
            },
            Tier::Venue => TierLimits {
                daily_requests: Limit::Unlimited,
                daily_votes: Limit::Unlimited,
                daily_rooms: Limit::Unlimited,
                max_room_size: 500,
                vote_weight: 5,
                priority_voting: true,
                can_create_groups: true,
                can_direct_message: true,
                max_friends: Limit::Unlimited,
                dj_controls: true,
                analytics: true,
                multi_room: true,
                branding: true,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Pro => "pro",
            Tier::Venue => "venue",
        }
    }
}

impl TierLimits {
    /// The weight a vote cast under these limits carries
    pub fn effective_vote_weight(&self) -> u32 {
        if self.priority_voting {
            self.vote_weight
        } else {
            1
        }
    }
}

impl Limit {
    /// Returns true if one more action is allowed after `used` actions
    pub fn allows(&self, used: u32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Max(max) => used < *max,
        }
    }

    pub fn max(&self) -> Option<u32> {
        match self {
            Limit::Unlimited => None,
            Limit::Max(max) => Some(*max),
        }
    }
}

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "pro" | "dj_pro" => Ok(Tier::Pro),
            "venue" => Ok(Tier::Venue),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::Max(max) => write!(f, "{}", max),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Limit, Tier};

    #[test]
    fn weight_requires_priority_voting() {
        assert_eq!(Tier::Free.limits().effective_vote_weight(), 1);
        assert_eq!(Tier::Premium.limits().effective_vote_weight(), 2);
        assert_eq!(Tier::Pro.limits().effective_vote_weight(), 3);
        assert_eq!(Tier::Venue.limits().effective_vote_weight(), 5);

        let mut limits = Tier::Venue.limits();
        limits.priority_voting = false;
        assert_eq!(limits.effective_vote_weight(), 1);
    }

    #[test]
    fn limit_boundary() {
        let limit = Limit::Max(5);

        assert!(limit.allows(4));
        assert!(!limit.allows(5));
        assert!(Limit::Unlimited.allows(u32::MAX));
    }

    #[test]
    fn parses_stored_names() {
        assert_eq!("dj_pro".parse::<Tier>(), Ok(Tier::Pro));
        assert_eq!(" Premium ".parse::<Tier>(), Ok(Tier::Premium));
        assert!("platinum".parse::<Tier>().is_err());

        for tier in Tier::ALL {
            assert_eq!(tier.to_string().parse::<Tier>(), Ok(tier));
        }
    }
}
