use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use groove_core::{CounterKind, Limit, PlayedCause, QuotaDecision, Tier, Usage, VoteDirection};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

use crate::TrackInfo;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type BoxedTransaction<'a> = Box<dyn Transaction + 'a>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// A concurrent transaction got in the way, retrying may succeed
    #[error("Transaction was aborted by a concurrent update")]
    Contention,
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a store that holds groove data.
/// Accounts are read and written directly, everything the engine decides on goes through a [Transaction].
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    /// Returns how many sessions were removed
    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Starts a transaction. Dropping it without committing rolls it back.
    async fn begin(&self) -> Result<BoxedTransaction<'_>>;
}

/// A unit of reads and writes that either commits fully or not at all.
///
/// Reading a room holds it until the transaction ends, so two transactions
/// touching the same room never interleave their read-decide-write steps.
#[async_trait]
pub trait Transaction: Send {
    async fn room_by_id(&mut self, room_id: PrimaryKey) -> Result<RoomData>;
    /// Only finds rooms that are active
    async fn active_room_by_code(&mut self, code: &str) -> Result<RoomData>;
    async fn create_room(&mut self, new_room: NewRoom) -> Result<RoomData>;
    async fn close_room(&mut self, room_id: PrimaryKey) -> Result<()>;
    async fn set_now_playing(&mut self, room_id: PrimaryKey, item_id: Option<PrimaryKey>)
        -> Result<()>;

    /// Ordered by join time
    async fn room_members(&mut self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>>;
    /// Returns false if the user was already a member
    async fn create_room_member(&mut self, new_member: NewRoomMember) -> Result<bool>;
    /// Returns false if the user wasn't a member
    async fn delete_room_member(&mut self, room_id: PrimaryKey, user_id: PrimaryKey)
        -> Result<bool>;

    async fn usage(&mut self, user_id: PrimaryKey, day: NaiveDate) -> Result<Usage>;
    /// Increments a counter if it is below the limit, creating the row for the day if needed.
    /// The check and the increment happen as one step.
    async fn increment_usage(
        &mut self,
        user_id: PrimaryKey,
        day: NaiveDate,
        kind: CounterKind,
        limit: Limit,
    ) -> Result<QuotaDecision>;

    async fn create_queue_item(&mut self, new_item: NewQueueItem) -> Result<QueueItemData>;
    async fn queue_item_by_id(&mut self, item_id: PrimaryKey) -> Result<QueueItemData>;
    /// Items that have not been played yet, in no particular order
    async fn queued_items(&mut self, room_id: PrimaryKey) -> Result<Vec<QueueItemData>>;
    async fn mark_played(
        &mut self,
        item_id: PrimaryKey,
        at: DateTime<Utc>,
        cause: PlayedCause,
    ) -> Result<()>;

    async fn votes_for_item(&mut self, item_id: PrimaryKey) -> Result<Vec<VoteData>>;
    /// Votes on the queued items of a room
    async fn votes_for_room(&mut self, room_id: PrimaryKey) -> Result<Vec<VoteData>>;
    /// Removes the user's previous vote on the item, if any, then stores the new one
    async fn replace_vote(&mut self, new_vote: NewVote) -> Result<()>;
    async fn clear_votes(&mut self, item_id: PrimaryKey) -> Result<()>;

    /// Returns false if the user already voted to skip the item
    async fn create_skip_vote(&mut self, new_skip_vote: NewSkipVote) -> Result<bool>;
    /// The users that voted to skip the item
    async fn skip_voters(&mut self, room_id: PrimaryKey, item_id: PrimaryKey)
        -> Result<Vec<PrimaryKey>>;
    /// Clears skip votes of one item, or of the whole room when `item_id` is None
    async fn clear_skip_votes(&mut self, room_id: PrimaryKey, item_id: Option<PrimaryKey>)
        -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub tier: Tier,
}

#[derive(Debug, Default)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub display_name: Option<String>,
    pub tier: Option<Tier>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub code: String,
    pub name: String,
    /// The host of the new room
    pub host_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoomMember {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub is_dj: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewQueueItem {
    pub room_id: PrimaryKey,
    pub added_by: PrimaryKey,
    pub track: TrackInfo,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewVote {
    pub queue_item_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub direction: VoteDirection,
    pub weight: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewSkipVote {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub queue_item_id: PrimaryKey,
}
