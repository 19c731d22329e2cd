use groove_core::VoteDirection;
use serde::Serialize;

use crate::{
    queues::{queue_item, rank},
    CollabResult, Identity, Operation, PrimaryKey, QueueItemData, RoomData, RoomMemberData,
    SkipConsensus, SkipStatus,
};

use super::room;

/// Everything a member needs to render a room
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room: RoomData,
    /// True if the viewer hosts the room
    pub is_host: bool,
    /// Ordered by join time
    pub members: Vec<RoomMemberData>,
    /// The live queue in play order
    pub queue: Vec<QueueEntry>,
    pub now_playing: Option<QueueItemData>,
    pub skip: Option<SkipStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub item: QueueItemData,
    pub score: i64,
    pub up: u32,
    pub down: u32,
    /// The viewer's own vote on the item
    pub my_vote: Option<VoteDirection>,
}

impl RoomSnapshot {
    /// Reads the state of a room as the given user sees it. Closed rooms can still be read.
    pub async fn read(
        op: &mut Operation<'_>,
        identity: &Identity,
        room_id: PrimaryKey,
        skips: &SkipConsensus,
    ) -> CollabResult<Self> {
        let room = room(op, room_id).await?;
        let members = op.tx.room_members(room.id).await?;

        let items = op.tx.queued_items(room.id).await?;
        let votes = op.tx.votes_for_room(room.id).await?;

        let queue = rank(items, &votes)
            .into_iter()
            .map(|ranked| {
                let my_vote = votes
                    .iter()
                    .find(|v| v.queue_item_id == ranked.item.id && v.user_id == identity.user_id)
                    .map(|v| v.direction);

                QueueEntry {
                    score: ranked.score,
                    up: ranked.tally.up,
                    down: ranked.tally.down,
                    item: ranked.item,
                    my_vote,
                }
            })
            .collect();

        let now_playing = match room.now_playing {
            Some(item_id) => Some(queue_item(op, item_id).await?),
            None => None,
        };

        let skip = skips.status(op, &room, &members, identity.user_id).await?;

        Ok(Self {
            is_host: room.is_host(identity.user_id),
            room,
            members,
            queue,
            now_playing,
            skip,
        })
    }
}
