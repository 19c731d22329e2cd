use chrono::{DateTime, Utc};
use groove_core::{QueueItemState, Tier, VoteDirection};
use serde::Serialize;

use crate::TrackInfo;

pub use groove_core::PrimaryKey;

/// A groove account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    /// The argon2 hash of the password
    pub password: String,
    pub display_name: String,
    pub tier: Tier,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A groove room
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub id: PrimaryKey,
    /// The code used to join the room
    pub code: String,
    pub name: String,
    pub host_id: PrimaryKey,
    /// Closed rooms never reopen
    pub active: bool,
    /// The item the host last advanced to, unless it was skipped since
    pub now_playing: Option<PrimaryKey>,
    pub created_at: DateTime<Utc>,
}

/// A member of a room
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberData {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub username: String,
    pub display_name: String,
    /// The host joins as DJ
    pub is_dj: bool,
    pub joined_at: DateTime<Utc>,
}

/// A track someone put in a room's queue
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub added_by: PrimaryKey,
    pub track: TrackInfo,
    pub created_at: DateTime<Utc>,
    pub state: QueueItemState,
}

/// A single user's vote on a queue item.
/// Note: `queue_item_id` and `user_id` are unique together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteData {
    pub queue_item_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub direction: VoteDirection,
    /// Snapshotted from the voter's tier when the vote was cast
    pub weight: u32,
}

impl RoomData {
    pub fn is_host(&self, user_id: PrimaryKey) -> bool {
        self.host_id == user_id
    }
}
