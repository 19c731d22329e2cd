mod snapshot;

use groove_core::{Config, CounterKind, JoinCode};
use log::{info, warn};
use rand::thread_rng;

pub use snapshot::*;

use crate::{
    CollabError, CollabEvent, CollabResult, DatabaseError, Identity, NewRoom, NewRoomMember,
    Operation, PrimaryKey, QuotaTracker, RoomData, RoomMemberData,
};

/// Room lifecycle: creation, membership, and closing
pub struct RoomRegistry {
    config: Config,
    quota: QuotaTracker,
}

impl RoomRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            quota: QuotaTracker,
        }
    }

    /// Creates a new room with the caller as host and DJ
    pub async fn create_room(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        name: &str,
    ) -> CollabResult<RoomData> {
        let name = name.trim();
        let max_length = self.config.max_room_name_length;

        if name.is_empty() {
            return Err(CollabError::InvalidInput("Room name required".into()));
        }

        if name.chars().count() > max_length {
            return Err(CollabError::InvalidInput(format!(
                "Room name can be at most {} characters",
                max_length
            )));
        }

        self.quota
            .check_and_increment(op, identity, CounterKind::RoomsCreated)
            .await?;

        let code = self.unused_code(op).await?;
        let room = op
            .tx
            .create_room(NewRoom {
                code: code.to_string(),
                name: name.to_string(),
                host_id: identity.user_id,
                created_at: op.now(),
            })
            .await?;

        op.tx
            .create_room_member(NewRoomMember {
                room_id: room.id,
                user_id: identity.user_id,
                is_dj: true,
                joined_at: op.now(),
            })
            .await?;

        info!("Room {} ({}) created by user {}", room.name, room.code, room.host_id);
        op.emit(CollabEvent::RoomCreated { room: room.clone() });

        Ok(room)
    }

    /// Joins an active room by its code. Joining a room twice is fine.
    pub async fn join_room(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        code: &str,
    ) -> CollabResult<RoomData> {
        let code: JoinCode = code
            .parse()
            .map_err(|_| CollabError::not_found("room", code.trim()))?;

        let room = op
            .tx
            .active_room_by_code(code.as_str())
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => CollabError::not_found("room", &code),
                e => e.into(),
            })?;

        let members = op.tx.room_members(room.id).await?;

        if members.iter().any(|m| m.user_id == identity.user_id) {
            return Ok(room);
        }

        // The joiner's own tier decides how big a room they can get into
        let capacity = identity.tier.limits().max_room_size;
        if members.len() >= capacity as usize {
            return Err(CollabError::CapacityExceeded { capacity });
        }

        op.tx
            .create_room_member(NewRoomMember {
                room_id: room.id,
                user_id: identity.user_id,
                is_dj: false,
                joined_at: op.now(),
            })
            .await?;

        let new_member = op
            .tx
            .room_members(room.id)
            .await?
            .into_iter()
            .find(|m| m.user_id == identity.user_id)
            .ok_or_else(|| CollabError::Internal("Membership was not stored".into()))?;

        op.emit(CollabEvent::MemberJoined {
            room_id: room.id,
            new_member,
        });

        Ok(room)
    }

    /// Leaves a room. If the host leaves, the room closes for good.
    pub async fn leave_room(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        room_id: PrimaryKey,
    ) -> CollabResult<()> {
        let room = room(op, room_id).await?;
        let removed = op.tx.delete_room_member(room.id, identity.user_id).await?;

        if removed {
            op.emit(CollabEvent::MemberLeft {
                room_id: room.id,
                member_id: identity.user_id,
            });
        }

        if room.active && room.is_host(identity.user_id) {
            op.tx.close_room(room.id).await?;

            info!("Room {} ({}) closed", room.name, room.code);
            op.emit(CollabEvent::RoomClosed { room_id: room.id });
        }

        Ok(())
    }

    /// Tries random codes until one isn't used by an active room
    async fn unused_code(&self, op: &mut Operation<'_>) -> CollabResult<JoinCode> {
        let attempts = self.config.join_code_attempts;

        for attempt in 1..=attempts {
            let code = JoinCode::generate(&mut thread_rng());

            match op.tx.active_room_by_code(code.as_str()).await {
                Err(DatabaseError::NotFound { .. }) => return Ok(code),
                Ok(_) => warn!("Join code {} is taken ({}/{})", code, attempt, attempts),
                Err(e) => return Err(e.into()),
            }
        }

        Err(CollabError::Conflict(
            "Could not find an unused join code".into(),
        ))
    }
}

/// Reads and locks a room
pub(crate) async fn room(op: &mut Operation<'_>, room_id: PrimaryKey) -> CollabResult<RoomData> {
    op.tx.room_by_id(room_id).await.map_err(|e| match e {
        DatabaseError::NotFound { .. } => CollabError::not_found("room", room_id),
        e => e.into(),
    })
}

/// Reads and locks a room, treating closed rooms as missing
pub(crate) async fn active_room(
    op: &mut Operation<'_>,
    room_id: PrimaryKey,
) -> CollabResult<RoomData> {
    let room = room(op, room_id).await?;

    if !room.active {
        return Err(CollabError::not_found("room", room_id));
    }

    Ok(room)
}

/// Returns the room's members, failing unless the user is one of them
pub(crate) async fn members_including(
    op: &mut Operation<'_>,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
) -> CollabResult<Vec<RoomMemberData>> {
    let members = op.tx.room_members(room_id).await?;

    if !members.iter().any(|m| m.user_id == user_id) {
        return Err(CollabError::Forbidden("Not a member of this room"));
    }

    Ok(members)
}

#[cfg(test)]
mod test {
    use groove_core::{Tier, JOIN_CODE_LENGTH};

    use crate::{testing::Harness, CollabError, CollabEvent};

    #[tokio::test]
    async fn host_creates_and_others_join_by_code() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let guest = h.user("guest", Tier::Free).await;

        let room = h.collab.create_room(&host.token, "  Friday night ").await.unwrap();
        assert_eq!(room.name, "Friday night");
        assert_eq!(room.code.len(), JOIN_CODE_LENGTH);
        assert!(room.active);

        let joined = h
            .collab
            .join_room(&guest.token, &format!(" {} ", room.code.to_lowercase()))
            .await
            .unwrap();
        assert_eq!(joined.id, room.id);

        // Joining again is not an error and adds nobody
        h.collab.join_room(&guest.token, &room.code).await.unwrap();

        let snapshot = h.collab.room_snapshot(&guest.token, room.id).await.unwrap();
        let members: Vec<_> = snapshot
            .members
            .iter()
            .map(|m| (m.user_id, m.is_dj))
            .collect();

        assert_eq!(members, vec![(host.id, true), (guest.id, false)]);
        assert!(!snapshot.is_host);
        assert!(h
            .collab
            .room_snapshot(&host.token, room.id)
            .await
            .unwrap()
            .is_host);
    }

    #[tokio::test]
    async fn capacity_depends_on_the_joiner() {
        let h = Harness::new();
        let host = h.user("host", Tier::Venue).await;
        let room = h.collab.create_room(&host.token, "Club").await.unwrap();

        for i in 0..7 {
            let user = h.user(&format!("free{}", i), Tier::Free).await;
            h.collab.join_room(&user.token, &room.code).await.unwrap();
        }

        let ninth = h.user("free7", Tier::Free).await;
        assert!(matches!(
            h.collab.join_room(&ninth.token, &room.code).await,
            Err(CollabError::CapacityExceeded { capacity: 8 })
        ));

        // A premium user can still get into the same room
        let premium = h.user("premium", Tier::Premium).await;
        h.collab.join_room(&premium.token, &room.code).await.unwrap();

        let snapshot = h.collab.room_snapshot(&host.token, room.id).await.unwrap();
        assert_eq!(snapshot.members.len(), 9);
    }

    #[tokio::test]
    async fn downgrades_do_not_evict_members() {
        let h = Harness::new();
        let host = h.user("host", Tier::Premium).await;
        let room = h.collab.create_room(&host.token, "Big night").await.unwrap();

        let mut guests = Vec::new();
        for i in 0..9 {
            let guest = h.user(&format!("guest{}", i), Tier::Premium).await;
            h.collab.join_room(&guest.token, &room.code).await.unwrap();
            guests.push(guest);
        }

        h.collab.auth.set_tier(host.id, Tier::Free).await.unwrap();
        h.collab.auth.set_tier(guests[0].id, Tier::Free).await.unwrap();

        let snapshot = h.collab.room_snapshot(&host.token, room.id).await.unwrap();
        assert_eq!(snapshot.members.len(), 10);
        assert!(snapshot.room.active);

        // Members who are already in are not checked again
        h.collab.join_room(&guests[0].token, &room.code).await.unwrap();
        h.enqueue(&host, room.id, "Around the World").await;

        let newcomer = h.user("newcomer", Tier::Free).await;
        assert!(matches!(
            h.collab.join_room(&newcomer.token, &room.code).await,
            Err(CollabError::CapacityExceeded { capacity: 8 })
        ));

        let snapshot = h.collab.room_snapshot(&host.token, room.id).await.unwrap();
        assert_eq!(snapshot.members.len(), 10);
    }

    #[tokio::test]
    async fn host_leaving_closes_the_room() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let guest = h.user("guest", Tier::Free).await;
        let late = h.user("late", Tier::Free).await;
        let room_id = h.room(&host, &[&guest]).await;

        let code = h
            .collab
            .room_snapshot(&guest.token, room_id)
            .await
            .unwrap()
            .room
            .code;

        h.collab.leave_room(&host.token, room_id).await.unwrap();

        assert!(matches!(
            h.collab.join_room(&late.token, &code).await,
            Err(CollabError::NotFound { .. })
        ));
        assert!(matches!(
            h.collab
                .enqueue_track(&guest.token, room_id, crate::testing::track("One More Time"))
                .await,
            Err(CollabError::NotFound { .. })
        ));

        // Still readable, but closed
        let snapshot = h.collab.room_snapshot(&guest.token, room_id).await.unwrap();
        assert!(!snapshot.room.active);

        // Leaving twice is fine
        h.collab.leave_room(&guest.token, room_id).await.unwrap();
        h.collab.leave_room(&guest.token, room_id).await.unwrap();
    }

    #[tokio::test]
    async fn guest_leaving_keeps_the_room_open() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let guest = h.user("guest", Tier::Free).await;
        let room_id = h.room(&host, &[&guest]).await;

        h.collab.leave_room(&guest.token, room_id).await.unwrap();

        let snapshot = h.collab.room_snapshot(&host.token, room_id).await.unwrap();
        assert!(snapshot.room.active);
        assert_eq!(snapshot.members.len(), 1);
    }

    #[tokio::test]
    async fn room_names_are_validated() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;

        assert!(matches!(
            h.collab.create_room(&host.token, "   ").await,
            Err(CollabError::InvalidInput(_))
        ));
        assert!(matches!(
            h.collab.create_room(&host.token, &"x".repeat(65)).await,
            Err(CollabError::InvalidInput(_))
        ));
        assert!(h.collab.create_room(&host.token, &"x".repeat(64)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_codes_and_credentials() {
        let h = Harness::new();
        let user = h.user("user", Tier::Free).await;

        assert!(matches!(
            h.collab.join_room(&user.token, "ZZZZZZ").await,
            Err(CollabError::NotFound { .. })
        ));
        assert!(matches!(
            h.collab.join_room(&user.token, "nope").await,
            Err(CollabError::NotFound { .. })
        ));
        assert!(matches!(
            h.collab.create_room("not-a-token", "Room").await,
            Err(CollabError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn events_follow_commits() {
        let h = Harness::new();
        let events = h.collab.events();
        let host = h.user("host", Tier::Free).await;
        let guest = h.user("guest", Tier::Free).await;

        let room_id = h.room(&host, &[&guest]).await;

        assert!(matches!(
            events.try_recv(),
            Ok(CollabEvent::RoomCreated { room }) if room.id == room_id
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(CollabEvent::MemberJoined { new_member, .. }) if new_member.user_id == guest.id
        ));

        // Failed operations emit nothing
        let _ = h.collab.create_room(&host.token, "").await;
        assert!(events.try_recv().is_err());

        h.collab.leave_room(&host.token, room_id).await.unwrap();
        let left = events.try_recv().unwrap();
        let closed = events.try_recv().unwrap();

        assert!(matches!(left, CollabEvent::MemberLeft { member_id, .. } if member_id == host.id));
        assert!(matches!(closed, CollabEvent::RoomClosed { .. }));
        assert_eq!(closed.room_id(), room_id);
    }
}
