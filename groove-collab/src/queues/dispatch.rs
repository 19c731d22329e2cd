use groove_core::{PlayedCause, QueueItemState};
use log::info;
use serde::Serialize;

use crate::{
    rooms::room, CollabError, CollabEvent, CollabResult, Identity, Operation, PrimaryKey,
    QueueItemData,
};

use super::ordering;

/// Moves playback forward. Only the host can do this.
#[derive(Debug, Default, Clone)]
pub struct Dispatcher;

/// What playback advanced to
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "item")]
pub enum Advance {
    Next(QueueItemData),
    /// Nothing was queued, nothing changed
    Empty,
}

impl Dispatcher {
    /// Plays the top of the queue and resets skip voting for the room
    pub async fn advance(
        &self,
        op: &mut Operation<'_>,
        identity: &Identity,
        room_id: PrimaryKey,
    ) -> CollabResult<Advance> {
        let room = room(op, room_id).await?;

        if !room.is_host(identity.user_id) {
            return Err(CollabError::Forbidden("Only the host can advance playback"));
        }

        if !room.active {
            return Err(CollabError::not_found("room", room_id));
        }

        let Some(head) = ordering(op, room.id).await?.into_iter().next() else {
            return Ok(Advance::Empty);
        };

        let now = op.now();
        let mut item = head.item;

        op.tx
            .mark_played(item.id, now, PlayedCause::Advanced)
            .await?;
        op.tx.set_now_playing(room.id, Some(item.id)).await?;
        op.tx.clear_skip_votes(room.id, None).await?;

        item.state = QueueItemState::Played {
            at: now,
            cause: PlayedCause::Advanced,
        };

        info!(
            "Room {} is now playing {} - {}",
            room.code, item.track.artist, item.track.title
        );

        op.emit(CollabEvent::PlaybackAdvanced {
            room_id: room.id,
            item: item.clone(),
        });

        Ok(Advance::Next(item))
    }
}
