use std::collections::HashMap;

use groove_core::{CounterKind, PlayedCause, RankKey, Tally, VoteDirection};
use log::{debug, info};
use serde::Serialize;

use crate::{
    rooms::{active_room, members_including},
    CollabEvent, CollabResult, Identity, InvalidVote, NewQueueItem, NewVote, Operation,
    PrimaryKey, QueueItemData, QuotaTracker, TrackInfo, VoteData,
};

use super::queue_item;

/// The live queue of a room and the votes on it
#[derive(Debug, Default, Clone)]
pub struct QueueLedger {
    quota: QuotaTracker,
}

/// The tally of an item right after a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    pub score: i64,
    pub up: u32,
    pub down: u32,
    /// True if the vote got the item removed from the queue
    pub auto_removed: bool,
}

/// A queued item with its current tally
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub item: QueueItemData,
    pub score: i64,
    pub tally: Tally,
}

impl QueueLedger {
    /// Adds a track to the end of a room's queue, counting against the daily request quota
    pub async fn enqueue(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        room_id: PrimaryKey,
        track: TrackInfo,
    ) -> CollabResult<QueueItemData> {
        let track = track.validated()?;
        let room = active_room(op, room_id).await?;

        members_including(op, room.id, identity.user_id).await?;

        self.quota
            .check_and_increment(op, identity, CounterKind::Requests)
            .await?;

        let item = op
            .tx
            .create_queue_item(NewQueueItem {
                room_id: room.id,
                added_by: identity.user_id,
                track,
                created_at: op.now(),
            })
            .await?;

        info!(
            "User {} queued {} - {} in room {}",
            identity.user_id, item.track.artist, item.track.title, room.code
        );
        op.emit(CollabEvent::ItemQueued { item: item.clone() });

        Ok(item)
    }

    /// Records the user's vote on a queued item, replacing any earlier one.
    /// An item whose down votes outweigh its up votes is removed on the spot.
    pub async fn cast_vote(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        item_id: PrimaryKey,
        direction: VoteDirection,
    ) -> CollabResult<VoteResult> {
        let item = queue_item(op, item_id).await?;
        let room = active_room(op, item.room_id).await?;

        // Read again with the room locked, a concurrent veto may have removed it
        let item = queue_item(op, item.id).await?;
        if !item.state.is_queued() {
            return Err(InvalidVote::Stale.into());
        }

        members_including(op, room.id, identity.user_id).await?;

        self.quota
            .check_and_increment(op, identity, CounterKind::Votes)
            .await?;

        let weight = identity.tier.limits().effective_vote_weight();

        op.tx
            .replace_vote(NewVote {
                queue_item_id: item.id,
                user_id: identity.user_id,
                direction,
                weight,
                created_at: op.now(),
            })
            .await?;

        let votes = op.tx.votes_for_item(item.id).await?;
        let tally = Tally::from_ballots(votes.iter().map(|v| (v.direction, v.weight)));

        debug!(
            "User {} voted {} (x{}) on item {}, now {}/{}",
            identity.user_id, direction, weight, item.id, tally.up, tally.down
        );

        op.emit(CollabEvent::VoteCast {
            room_id: room.id,
            item_id: item.id,
            user_id: identity.user_id,
            direction,
            tally,
        });

        let auto_removed = tally.vetoes();

        if auto_removed {
            op.tx
                .mark_played(item.id, op.now(), PlayedCause::Vetoed)
                .await?;
            op.tx.clear_votes(item.id).await?;

            info!("Item {} was voted out of room {}", item.id, room.code);
            op.emit(CollabEvent::ItemVetoed {
                room_id: room.id,
                item_id: item.id,
            });
        }

        Ok(VoteResult {
            score: tally.score(),
            up: tally.up,
            down: tally.down,
            auto_removed,
        })
    }

    /// The queued items of a room in the order they would play
    pub async fn ordering(
        &self,
        op: &mut Operation<'_>,
        room_id: PrimaryKey,
    ) -> CollabResult<Vec<RankedItem>> {
        ordering(op, room_id).await
    }
}

pub(crate) async fn ordering(
    op: &mut Operation<'_>,
    room_id: PrimaryKey,
) -> CollabResult<Vec<RankedItem>> {
    let items = op.tx.queued_items(room_id).await?;
    let votes = op.tx.votes_for_room(room_id).await?;

    Ok(rank(items, &votes))
}

/// Orders items by score, highest first. Ties go to the earlier item, then the lower id.
pub fn rank(items: Vec<QueueItemData>, votes: &[VoteData]) -> Vec<RankedItem> {
    let mut ballots: HashMap<PrimaryKey, Vec<(VoteDirection, u32)>> = HashMap::new();

    for vote in votes {
        ballots
            .entry(vote.queue_item_id)
            .or_default()
            .push((vote.direction, vote.weight));
    }

    let mut ranked: Vec<_> = items
        .into_iter()
        .filter(|item| item.state.is_queued())
        .map(|item| {
            let tally = Tally::from_ballots(ballots.remove(&item.id).unwrap_or_default());

            RankedItem {
                score: tally.score(),
                tally,
                item,
            }
        })
        .collect();

    ranked.sort_by_key(|r| RankKey {
        score: r.score,
        created_at: r.item.created_at,
        id: r.item.id,
    });

    ranked
}
