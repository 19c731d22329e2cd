use chrono::{DateTime, Utc};

use crate::{
    events::emit, BoxedTransaction, CollabContext, CollabEvent, CollabResult, Database,
    EventSender,
};

/// One engine operation: a store transaction, and the events to emit once it commits.
///
/// Dropping an operation without committing it rolls back every write and discards the events.
pub struct Operation<'a> {
    pub(crate) tx: BoxedTransaction<'a>,
    events: Vec<CollabEvent>,
    sender: &'a EventSender,
    now: DateTime<Utc>,
}

impl<'a> Operation<'a> {
    pub async fn begin<Db>(context: &'a CollabContext<Db>) -> CollabResult<Operation<'a>>
    where
        Db: Database,
    {
        let tx = context.database.begin().await?;

        Ok(Self {
            tx,
            events: Vec::new(),
            sender: &context.events,
            now: context.clock.now(),
        })
    }

    /// The time the operation started. Everything it writes is stamped with it.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub(crate) fn emit(&mut self, event: CollabEvent) {
        self.events.push(event);
    }

    pub async fn commit(self) -> CollabResult<()> {
        self.tx.commit().await?;
        emit(self.sender, self.events);

        Ok(())
    }
}
