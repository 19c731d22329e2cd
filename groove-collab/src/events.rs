use crossbeam::channel::{Receiver, Sender};
use groove_core::{SkipDecision, Tally, VoteDirection};
use log::debug;

use crate::{PrimaryKey, QueueItemData, RoomData, RoomMemberData};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system after a change has been committed
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A room was created, the host is already a member
    RoomCreated { room: RoomData },
    /// User became a member of a room
    MemberJoined {
        room_id: PrimaryKey,
        new_member: RoomMemberData,
    },
    /// User left a room
    MemberLeft {
        room_id: PrimaryKey,
        member_id: PrimaryKey,
    },
    /// The host left, the room can no longer be joined
    RoomClosed { room_id: PrimaryKey },
    /// A track was added to a room's queue
    ItemQueued { item: QueueItemData },
    /// A vote changed the tally of a queued item
    VoteCast {
        room_id: PrimaryKey,
        item_id: PrimaryKey,
        user_id: PrimaryKey,
        direction: VoteDirection,
        tally: Tally,
    },
    /// Down votes outweighed up votes and the item was removed
    ItemVetoed {
        room_id: PrimaryKey,
        item_id: PrimaryKey,
    },
    /// Someone voted to skip the playing item
    SkipVoteCast {
        room_id: PrimaryKey,
        item_id: PrimaryKey,
        decision: SkipDecision,
    },
    /// Enough members voted to skip the playing item
    ItemSkipped {
        room_id: PrimaryKey,
        item_id: PrimaryKey,
    },
    /// The host advanced playback to a new item
    PlaybackAdvanced {
        room_id: PrimaryKey,
        item: QueueItemData,
    },
}

impl CollabEvent {
    /// The room the event happened in
    pub fn room_id(&self) -> PrimaryKey {
        match self {
            Self::RoomCreated { room } => room.id,
            Self::ItemQueued { item } => item.room_id,
            Self::MemberJoined { room_id, .. }
            | Self::MemberLeft { room_id, .. }
            | Self::RoomClosed { room_id }
            | Self::VoteCast { room_id, .. }
            | Self::ItemVetoed { room_id, .. }
            | Self::SkipVoteCast { room_id, .. }
            | Self::ItemSkipped { room_id, .. }
            | Self::PlaybackAdvanced { room_id, .. } => *room_id,
        }
    }
}

/// Sends events, ignoring a dropped receiver
pub(crate) fn emit(sender: &EventSender, events: Vec<CollabEvent>) {
    for event in events {
        if sender.send(event).is_err() {
            debug!("Event receiver is gone, dropping events");
            return;
        }
    }
}
