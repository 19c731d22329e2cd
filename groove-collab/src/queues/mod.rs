mod dispatch;
mod ledger;
mod skip;

pub use dispatch::*;
pub use ledger::*;
pub use skip::*;

use crate::{CollabError, CollabResult, DatabaseError, Operation, PrimaryKey, QueueItemData};

/// Reads a queue item, reporting a missing one by its id
pub(crate) async fn queue_item(
    op: &mut Operation<'_>,
    item_id: PrimaryKey,
) -> CollabResult<QueueItemData> {
    op.tx.queue_item_by_id(item_id).await.map_err(|e| match e {
        DatabaseError::NotFound { .. } => CollabError::not_found("queue item", item_id),
        e => e.into(),
    })
}
