use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::atomic::{AtomicI32, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use groove_core::{CounterKind, Limit, PlayedCause, QueueItemState, QuotaDecision, Usage};
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    BoxedTransaction, Database, DatabaseError, NewQueueItem, NewRoom, NewRoomMember, NewSession,
    NewSkipVote, NewUser, NewVote, PrimaryKey, QueueItemData, Result, RoomData, RoomMemberData,
    SessionData, Transaction, UpdatedUser, UserData, VoteData,
};

/// A database that lives in memory, used in tests and for trying things out.
/// Transactions run one at a time and work on a copy of the state
/// that replaces the original on commit.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    next_user_id: AtomicI32,
    next_session_id: AtomicI32,
    users: DashMap<PrimaryKey, UserData>,
    usernames: DashMap<String, PrimaryKey>,
    sessions: DashMap<String, StoredSession>,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    id: PrimaryKey,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredMember {
    is_dj: bool,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    next_id: PrimaryKey,
    rooms: BTreeMap<PrimaryKey, RoomData>,
    members: BTreeMap<(PrimaryKey, PrimaryKey), StoredMember>,
    items: BTreeMap<PrimaryKey, QueueItemData>,
    votes: BTreeMap<(PrimaryKey, PrimaryKey), VoteData>,
    skip_votes: BTreeSet<(PrimaryKey, PrimaryKey, PrimaryKey)>,
    usage: HashMap<(PrimaryKey, NaiveDate), Usage>,
}

pub struct MemoryTransaction<'a> {
    users: &'a DashMap<PrimaryKey, UserData>,
    guard: MutexGuard<'a, MemoryState>,
    working: MemoryState,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_user_id(&self) -> PrimaryKey {
        self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_session_id(&self) -> PrimaryKey {
        self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl MemoryState {
    fn next_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or_else(|| not_found("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        let user_id = self
            .usernames
            .get(username)
            .map(|id| *id)
            .ok_or_else(|| not_found("user", "username"))?;

        self.user_by_id(user_id).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        // The entry stays locked until the user is stored, so only one
        // registration can claim a username
        let slot = match self.usernames.entry(new_user.username.clone()) {
            Entry::Occupied(_) => {
                return Err(DatabaseError::Conflict {
                    resource: "user",
                    field: "username",
                    value: new_user.username,
                })
            }
            Entry::Vacant(slot) => slot,
        };

        let user = UserData {
            id: self.next_user_id(),
            username: new_user.username,
            password: new_user.password,
            display_name: new_user.display_name,
            tier: new_user.tier,
        };

        self.users.insert(user.id, user.clone());
        slot.insert(user.id);

        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut user = self
            .users
            .get_mut(&updated_user.id)
            .ok_or_else(|| not_found("user", "id"))?;

        if let Some(display_name) = updated_user.display_name {
            user.display_name = display_name;
        }

        if let Some(tier) = updated_user.tier {
            user.tier = tier;
        }

        Ok(user.clone())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let session = self
            .sessions
            .get(token)
            .map(|s| s.clone())
            .ok_or_else(|| not_found("session", "token"))?;

        let user = self.user_by_id(session.user_id).await?;

        Ok(SessionData {
            id: session.id,
            token: token.to_string(),
            expires_at: session.expires_at,
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        // Ensure user exists
        let user = self.user_by_id(new_session.user_id).await?;

        let stored = match self.sessions.entry(new_session.token.clone()) {
            Entry::Occupied(_) => {
                return Err(DatabaseError::Conflict {
                    resource: "session",
                    field: "token",
                    value: new_session.token,
                })
            }
            Entry::Vacant(slot) => slot
                .insert(StoredSession {
                    id: self.next_session_id(),
                    user_id: new_session.user_id,
                    expires_at: new_session.expires_at,
                })
                .clone(),
        };

        Ok(SessionData {
            id: stored.id,
            token: new_session.token,
            expires_at: stored.expires_at,
            user,
        })
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        self.sessions
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| not_found("session", "token"))
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);

        Ok(before.saturating_sub(self.sessions.len()) as u64)
    }

    async fn begin(&self) -> Result<BoxedTransaction<'_>> {
        let guard = self.state.lock().await;
        let working = guard.clone();

        Ok(Box::new(MemoryTransaction {
            users: &self.users,
            guard,
            working,
        }))
    }
}

#[async_trait]
impl<'a> Transaction for MemoryTransaction<'a> {
    async fn room_by_id(&mut self, room_id: PrimaryKey) -> Result<RoomData> {
        self.working
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| not_found("room", "id"))
    }

    async fn active_room_by_code(&mut self, code: &str) -> Result<RoomData> {
        self.working
            .rooms
            .values()
            .find(|r| r.active && r.code == code)
            .cloned()
            .ok_or_else(|| not_found("room", "code"))
    }

    async fn create_room(&mut self, new_room: NewRoom) -> Result<RoomData> {
        if self.active_room_by_code(&new_room.code).await.is_ok() {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "code",
                value: new_room.code,
            });
        }

        let room = RoomData {
            id: self.working.next_id(),
            code: new_room.code,
            name: new_room.name,
            host_id: new_room.host_id,
            active: true,
            now_playing: None,
            created_at: new_room.created_at,
        };

        self.working.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn close_room(&mut self, room_id: PrimaryKey) -> Result<()> {
        let room = self
            .working
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| not_found("room", "id"))?;

        room.active = false;
        Ok(())
    }

    async fn set_now_playing(
        &mut self,
        room_id: PrimaryKey,
        item_id: Option<PrimaryKey>,
    ) -> Result<()> {
        let room = self
            .working
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| not_found("room", "id"))?;

        room.now_playing = item_id;
        Ok(())
    }

    async fn room_members(&mut self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>> {
        let mut members: Vec<_> = self
            .working
            .members
            .range((room_id, PrimaryKey::MIN)..=(room_id, PrimaryKey::MAX))
            .filter_map(|(&(room_id, user_id), member)| {
                let user = self.users.get(&user_id)?;

                Some(RoomMemberData {
                    room_id,
                    user_id,
                    username: user.username.clone(),
                    display_name: user.display_name.clone(),
                    is_dj: member.is_dj,
                    joined_at: member.joined_at,
                })
            })
            .collect();

        members.sort_by_key(|m| (m.joined_at, m.user_id));
        Ok(members)
    }

    async fn create_room_member(&mut self, new_member: NewRoomMember) -> Result<bool> {
        let key = (new_member.room_id, new_member.user_id);

        if self.working.members.contains_key(&key) {
            return Ok(false);
        }

        self.working.members.insert(
            key,
            StoredMember {
                is_dj: new_member.is_dj,
                joined_at: new_member.joined_at,
            },
        );

        Ok(true)
    }

    async fn delete_room_member(
        &mut self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<bool> {
        Ok(self.working.members.remove(&(room_id, user_id)).is_some())
    }

    async fn usage(&mut self, user_id: PrimaryKey, day: NaiveDate) -> Result<Usage> {
        Ok(self
            .working
            .usage
            .get(&(user_id, day))
            .copied()
            .unwrap_or_default())
    }

    async fn increment_usage(
        &mut self,
        user_id: PrimaryKey,
        day: NaiveDate,
        kind: CounterKind,
        limit: Limit,
    ) -> Result<QuotaDecision> {
        let usage = self.working.usage.entry((user_id, day)).or_default();
        let decision = QuotaDecision::evaluate(limit, usage.get(kind));

        if let QuotaDecision::Allowed { used, .. } = decision {
            *usage.get_mut(kind) = used;
        }

        Ok(decision)
    }

    async fn create_queue_item(&mut self, new_item: NewQueueItem) -> Result<QueueItemData> {
        let item = QueueItemData {
            id: self.working.next_id(),
            room_id: new_item.room_id,
            added_by: new_item.added_by,
            track: new_item.track,
            created_at: new_item.created_at,
            state: QueueItemState::Queued,
        };

        self.working.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn queue_item_by_id(&mut self, item_id: PrimaryKey) -> Result<QueueItemData> {
        self.working
            .items
            .get(&item_id)
            .cloned()
            .ok_or_else(|| not_found("queue item", "id"))
    }

    async fn queued_items(&mut self, room_id: PrimaryKey) -> Result<Vec<QueueItemData>> {
        Ok(self
            .working
            .items
            .values()
            .filter(|i| i.room_id == room_id && i.state.is_queued())
            .cloned()
            .collect())
    }

    async fn mark_played(
        &mut self,
        item_id: PrimaryKey,
        at: DateTime<Utc>,
        cause: PlayedCause,
    ) -> Result<()> {
        let item = self
            .working
            .items
            .get_mut(&item_id)
            .ok_or_else(|| not_found("queue item", "id"))?;

        item.state = QueueItemState::Played { at, cause };
        Ok(())
    }

    async fn votes_for_item(&mut self, item_id: PrimaryKey) -> Result<Vec<VoteData>> {
        Ok(self
            .working
            .votes
            .range((item_id, PrimaryKey::MIN)..=(item_id, PrimaryKey::MAX))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn votes_for_room(&mut self, room_id: PrimaryKey) -> Result<Vec<VoteData>> {
        let items = &self.working.items;

        Ok(self
            .working
            .votes
            .values()
            .filter(|v| {
                items
                    .get(&v.queue_item_id)
                    .is_some_and(|i| i.room_id == room_id && i.state.is_queued())
            })
            .cloned()
            .collect())
    }

    async fn replace_vote(&mut self, new_vote: NewVote) -> Result<()> {
        self.working.votes.insert(
            (new_vote.queue_item_id, new_vote.user_id),
            VoteData {
                queue_item_id: new_vote.queue_item_id,
                user_id: new_vote.user_id,
                direction: new_vote.direction,
                weight: new_vote.weight,
            },
        );

        Ok(())
    }

    async fn clear_votes(&mut self, item_id: PrimaryKey) -> Result<()> {
        self.working.votes.retain(|&(id, _), _| id != item_id);
        Ok(())
    }

    async fn create_skip_vote(&mut self, new_skip_vote: NewSkipVote) -> Result<bool> {
        Ok(self.working.skip_votes.insert((
            new_skip_vote.room_id,
            new_skip_vote.user_id,
            new_skip_vote.queue_item_id,
        )))
    }

    async fn skip_voters(
        &mut self,
        room_id: PrimaryKey,
        item_id: PrimaryKey,
    ) -> Result<Vec<PrimaryKey>> {
        Ok(self
            .working
            .skip_votes
            .iter()
            .filter(|&&(room, _, item)| room == room_id && item == item_id)
            .map(|&(_, user, _)| user)
            .collect())
    }

    async fn clear_skip_votes(
        &mut self,
        room_id: PrimaryKey,
        item_id: Option<PrimaryKey>,
    ) -> Result<()> {
        self.working.skip_votes.retain(|&(room, _, item)| {
            room != room_id || item_id.is_some_and(|id| id != item)
        });

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            mut guard, working, ..
        } = *self;

        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use chrono::{NaiveDate, TimeZone, Utc};
    use groove_core::{CounterKind, Limit, QuotaDecision, Tier};

    use std::sync::Arc;

    use super::MemoryDatabase;
    use crate::{Database, DatabaseError, NewRoom, NewSession, NewUser};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let db = MemoryDatabase::new();

        let mut tx = db.begin().await.unwrap();
        tx.increment_usage(1, day(), CounterKind::Votes, Limit::Unlimited)
            .await
            .unwrap();
        drop(tx);

        let mut tx = db.begin().await.unwrap();
        assert_eq!(tx.usage(1, day()).await.unwrap().vote_count, 0);
    }

    #[tokio::test]
    async fn committed_usage_persists_and_stops_at_limit() {
        let db = MemoryDatabase::new();

        for expected in 1..=2 {
            let mut tx = db.begin().await.unwrap();
            let decision = tx
                .increment_usage(1, day(), CounterKind::Requests, Limit::Max(2))
                .await
                .unwrap();

            assert_eq!(
                decision,
                QuotaDecision::Allowed {
                    used: expected,
                    limit: Limit::Max(2)
                }
            );
            tx.commit().await.unwrap();
        }

        let mut tx = db.begin().await.unwrap();
        let decision = tx
            .increment_usage(1, day(), CounterKind::Requests, Limit::Max(2))
            .await
            .unwrap();

        assert_eq!(decision, QuotaDecision::Denied { used: 2, limit: 2 });
        assert_eq!(tx.usage(1, day()).await.unwrap().request_count, 2);
    }

    #[tokio::test]
    async fn active_codes_are_unique() {
        let db = MemoryDatabase::new();
        let created_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let new_room = || NewRoom {
            code: "ABC234".to_string(),
            name: "Friday".to_string(),
            host_id: 1,
            created_at,
        };

        let mut tx = db.begin().await.unwrap();
        let room = tx.create_room(new_room()).await.unwrap();

        assert!(matches!(
            tx.create_room(new_room()).await,
            Err(DatabaseError::Conflict { .. })
        ));

        tx.close_room(room.id).await.unwrap();
        assert!(tx.create_room(new_room()).await.is_ok());
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let db = MemoryDatabase::new();
        let new_user = || NewUser {
            username: "ada".to_string(),
            password: "hash".to_string(),
            display_name: "Ada".to_string(),
            tier: Tier::Free,
        };

        db.create_user(new_user()).await.unwrap();
        assert!(matches!(
            db.create_user(new_user()).await,
            Err(DatabaseError::Conflict { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_registrations_create_one_user() {
        let db = Arc::new(MemoryDatabase::new());

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.create_user(NewUser {
                        username: "ada".to_string(),
                        password: "hash".to_string(),
                        display_name: format!("Ada {}", i),
                        tier: Tier::Free,
                    })
                    .await
                })
            })
            .collect();

        let mut created = 0;
        let mut conflicts = 0;

        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(DatabaseError::Conflict { .. }) => conflicts += 1,
                Err(err) => panic!("unexpected error: {}", err),
            }
        }

        assert_eq!((created, conflicts), (1, 15));
        assert_eq!(db.user_by_username("ada").await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn sessions_have_their_own_ids() {
        let db = MemoryDatabase::new();
        let expires_at = Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap();

        for name in ["ada", "grace", "linus"] {
            db.create_user(NewUser {
                username: name.to_string(),
                password: "hash".to_string(),
                display_name: name.to_string(),
                tier: Tier::Free,
            })
            .await
            .unwrap();
        }

        let first = db
            .create_session(NewSession {
                token: "first".to_string(),
                user_id: 3,
                expires_at,
            })
            .await
            .unwrap();

        let user = db
            .create_user(NewUser {
                username: "barbara".to_string(),
                password: "hash".to_string(),
                display_name: "Barbara".to_string(),
                tier: Tier::Free,
            })
            .await
            .unwrap();

        let second = db
            .create_session(NewSession {
                token: "second".to_string(),
                user_id: user.id,
                expires_at,
            })
            .await
            .unwrap();

        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(user.id, 4);
        assert_eq!(second.user.username, "barbara");

        assert!(matches!(
            db.create_session(NewSession {
                token: "first".to_string(),
                user_id: 1,
                expires_at,
            })
            .await,
            Err(DatabaseError::Conflict { .. })
        ));
    }
}
