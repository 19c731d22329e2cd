use groove_core::{skip_threshold, Config, PlayedCause, SkipDecision};
use log::{debug, info};
use serde::Serialize;

use crate::{
    rooms::{active_room, members_including},
    CollabError, CollabEvent, CollabResult, Identity, InvalidVote, NewSkipVote, Operation,
    PrimaryKey, RoomData, RoomMemberData,
};

use super::queue_item;

/// Majority voting on skipping whatever is playing in a room
#[derive(Debug, Clone)]
pub struct SkipConsensus {
    ratio: f32,
}

/// Where skip voting on the playing item stands, as seen by one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipStatus {
    pub item_id: PrimaryKey,
    pub count: usize,
    pub threshold: usize,
    /// True if the viewer has voted to skip
    pub voted: bool,
}

impl SkipConsensus {
    pub fn new(config: &Config) -> Self {
        Self {
            ratio: config.skip_ratio,
        }
    }

    /// Votes to skip the playing item. Voting twice changes nothing.
    pub async fn cast_skip_vote(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        room_id: PrimaryKey,
        item_id: PrimaryKey,
    ) -> CollabResult<SkipDecision> {
        let room = active_room(op, room_id).await?;
        let members = members_including(op, room.id, identity.user_id).await?;

        let item = queue_item(op, item_id).await?;
        if item.room_id != room.id {
            return Err(CollabError::not_found("queue item", item_id));
        }

        if room.now_playing != Some(item.id) {
            return Err(InvalidVote::NotPlaying.into());
        }

        let inserted = op
            .tx
            .create_skip_vote(NewSkipVote {
                room_id: room.id,
                user_id: identity.user_id,
                queue_item_id: item.id,
            })
            .await?;

        let decision = self.evaluate(op, &room, &members, item.id).await?;

        if inserted {
            debug!(
                "User {} voted to skip item {} ({}/{})",
                identity.user_id, item.id, decision.count, decision.threshold
            );

            op.emit(CollabEvent::SkipVoteCast {
                room_id: room.id,
                item_id: item.id,
                decision,
            });
        }

        Ok(decision)
    }

    /// Evicts the playing item if enough members want it skipped
    pub async fn evaluate(
        &self,
        op: &mut Operation<'_>,
        room: &RoomData,
        members: &[RoomMemberData],
        item_id: PrimaryKey,
    ) -> CollabResult<SkipDecision> {
        let count = op.tx.skip_voters(room.id, item_id).await?.len();
        let decision = SkipDecision::evaluate(count, members.len(), self.ratio);

        if decision.skipped {
            op.tx
                .mark_played(item_id, op.now(), PlayedCause::Skipped)
                .await?;
            op.tx.clear_skip_votes(room.id, Some(item_id)).await?;
            op.tx.set_now_playing(room.id, None).await?;

            info!("Item {} was skipped in room {}", item_id, room.code);
            op.emit(CollabEvent::ItemSkipped {
                room_id: room.id,
                item_id,
            });
        }

        Ok(decision)
    }

    pub fn threshold(&self, member_count: usize) -> usize {
        skip_threshold(member_count, self.ratio)
    }

    /// Skip voting on the playing item, if anything is playing
    pub async fn status(
        &self,
        op: &mut Operation<'_>,
        room: &RoomData,
        members: &[RoomMemberData],
        viewer: PrimaryKey,
    ) -> CollabResult<Option<SkipStatus>> {
        let Some(item_id) = room.now_playing else {
            return Ok(None);
        };

        let voters = op.tx.skip_voters(room.id, item_id).await?;

        Ok(Some(SkipStatus {
            item_id,
            count: voters.len(),
            threshold: self.threshold(members.len()),
            voted: voters.contains(&viewer),
        }))
    }
}

#[cfg(test)]
mod test {
    use groove_core::{PlayedCause, QueueItemState, Tier};

    use crate::{testing::Harness, Advance, CollabError, CollabEvent, InvalidVote};

    #[tokio::test]
    async fn half_the_room_skips_the_playing_item() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let a = h.user("a", Tier::Free).await;
        let b = h.user("b", Tier::Free).await;
        let c = h.user("c", Tier::Free).await;
        let room_id = h.room(&host, &[&a, &b, &c]).await;

        let item = h.enqueue(&host, room_id, "A").await;
        h.collab.advance_playback(&host.token, room_id).await.unwrap();

        let events = h.collab.events();
        while events.try_recv().is_ok() {}

        let first = h.collab.cast_skip_vote(&a.token, room_id, item).await.unwrap();
        assert_eq!((first.count, first.threshold, first.skipped), (1, 2, false));

        let again = h.collab.cast_skip_vote(&a.token, room_id, item).await.unwrap();
        assert_eq!(again, first);

        // Only the first vote was announced
        assert!(matches!(events.try_recv(), Ok(CollabEvent::SkipVoteCast { .. })));
        assert!(events.try_recv().is_err());

        let snapshot = h.collab.room_snapshot(&b.token, room_id).await.unwrap();
        let status = snapshot.skip.unwrap();
        assert_eq!((status.count, status.threshold, status.voted), (1, 2, false));

        let second = h.collab.cast_skip_vote(&b.token, room_id, item).await.unwrap();
        assert_eq!((second.count, second.threshold, second.skipped), (2, 2, true));

        let snapshot = h.collab.room_snapshot(&host.token, room_id).await.unwrap();
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.skip.is_none());

        assert!(matches!(
            h.collab.cast_skip_vote(&c.token, room_id, item).await,
            Err(CollabError::InvalidVote(InvalidVote::NotPlaying))
        ));
    }

    #[tokio::test]
    async fn skipped_items_are_marked_played() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let room_id = h.room(&host, &[]).await;

        let item = h.enqueue(&host, room_id, "A").await;
        h.collab.advance_playback(&host.token, room_id).await.unwrap();

        let events = h.collab.events();
        while events.try_recv().is_ok() {}

        // Alone in the room, one vote is a majority
        let decision = h.collab.cast_skip_vote(&host.token, room_id, item).await.unwrap();
        assert!(decision.skipped);

        assert!(matches!(events.try_recv(), Ok(CollabEvent::SkipVoteCast { .. })));
        assert!(matches!(
            events.try_recv(),
            Ok(CollabEvent::ItemSkipped { item_id, .. }) if item_id == item
        ));

        // The skipped item is gone for good, so advancing finds nothing
        assert!(matches!(
            h.collab.advance_playback(&host.token, room_id).await,
            Ok(Advance::Empty)
        ));
        assert!(matches!(
            h.collab.cast_queue_vote(&host.token, item, "up").await,
            Err(CollabError::InvalidVote(InvalidVote::Stale))
        ));
    }

    #[tokio::test]
    async fn only_the_playing_item_can_be_skipped() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let guest = h.user("guest", Tier::Free).await;
        let outsider = h.user("outsider", Tier::Free).await;
        let room_id = h.room(&host, &[&guest]).await;

        let queued = h.enqueue(&host, room_id, "A").await;

        assert!(matches!(
            h.collab.cast_skip_vote(&guest.token, room_id, queued).await,
            Err(CollabError::InvalidVote(InvalidVote::NotPlaying))
        ));

        let Advance::Next(playing) = h.collab.advance_playback(&host.token, room_id).await.unwrap()
        else {
            panic!("Expected an item to play");
        };
        assert_eq!(playing.id, queued);
        assert!(matches!(
            playing.state,
            QueueItemState::Played {
                cause: PlayedCause::Advanced,
                ..
            }
        ));

        assert!(matches!(
            h.collab.cast_skip_vote(&outsider.token, room_id, queued).await,
            Err(CollabError::Forbidden(_))
        ));
        assert!(matches!(
            h.collab.cast_skip_vote(&guest.token, room_id, 999).await,
            Err(CollabError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn votes_outlast_their_voters() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let a = h.user("a", Tier::Free).await;
        let b = h.user("b", Tier::Free).await;
        let c = h.user("c", Tier::Free).await;
        let room_id = h.room(&host, &[&a, &b, &c]).await;

        let item = h.enqueue(&host, room_id, "A").await;
        h.collab.advance_playback(&host.token, room_id).await.unwrap();

        h.collab.cast_skip_vote(&a.token, room_id, item).await.unwrap();
        h.collab.leave_room(&a.token, room_id).await.unwrap();

        // Leaving only moves the threshold, the vote still counts
        let status = h
            .collab
            .room_snapshot(&host.token, room_id)
            .await
            .unwrap()
            .skip
            .unwrap();
        assert_eq!((status.count, status.threshold), (1, 2));

        let decision = h.collab.cast_skip_vote(&b.token, room_id, item).await.unwrap();
        assert_eq!((decision.count, decision.threshold, decision.skipped), (2, 2, true));
    }

    #[tokio::test]
    async fn repeated_votes_see_the_current_threshold() {
        let h = Harness::new();
        let host = h.user("host", Tier::Free).await;
        let a = h.user("a", Tier::Free).await;
        let b = h.user("b", Tier::Free).await;
        let c = h.user("c", Tier::Free).await;
        let room_id = h.room(&host, &[&a, &b, &c]).await;

        let item = h.enqueue(&host, room_id, "A").await;
        h.collab.advance_playback(&host.token, room_id).await.unwrap();

        let first = h.collab.cast_skip_vote(&a.token, room_id, item).await.unwrap();
        assert_eq!((first.count, first.threshold, first.skipped), (1, 2, false));

        h.collab.leave_room(&b.token, room_id).await.unwrap();
        h.collab.leave_room(&c.token, room_id).await.unwrap();

        let repeated = h.collab.cast_skip_vote(&a.token, room_id, item).await.unwrap();
        assert_eq!((repeated.count, repeated.threshold, repeated.skipped), (1, 1, true));
    }
}
