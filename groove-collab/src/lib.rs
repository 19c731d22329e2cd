//! The groove collab system: rooms, a shared queue ordered by weighted votes,
//! skip consensus on the playing item, and per-tier daily quotas.
//!
//! Every operation authenticates the caller, runs in a single store transaction,
//! and emits its [CollabEvent]s only once that transaction has committed.

mod auth;
mod catalog;
mod db;
mod error;
mod events;
mod operation;
mod queues;
mod quota;
mod rooms;
mod track;
mod util;

#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use auth::*;
pub use catalog::*;
pub use db::*;
pub use error::*;
pub use events::*;
pub use operation::*;
pub use queues::*;
pub use quota::*;
pub use rooms::*;
pub use track::*;

use crossbeam::channel::unbounded;
use groove_core::{Clock, Config, SkipDecision, SystemClock, VoteDirection};

/// The groove collab system, facilitating rooms, voting, and playback order.
pub struct Collab<Db> {
    context: CollabContext<Db>,
    catalog: Arc<dyn Catalog>,
    events: EventReceiver,

    pub auth: Auth<Db>,
    pub quota: QuotaTracker,
    pub rooms: RoomRegistry,
    pub ledger: QueueLedger,
    pub skips: SkipConsensus,
    pub dispatcher: Dispatcher,
}

/// A type passed to various components of the collab system, to access state and emit events.
pub struct CollabContext<Db> {
    pub database: Arc<Db>,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub events: EventSender,
}

impl<Db> Collab<Db>
where
    Db: Database,
{
    pub fn new(database: Db, catalog: Arc<dyn Catalog>, config: Config) -> Self {
        Self::with_clock(database, catalog, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        database: Db,
        catalog: Arc<dyn Catalog>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let database = Arc::new(database);
        let (sender, receiver) = unbounded();

        let context = CollabContext {
            database: database.clone(),
            config: config.clone(),
            clock: clock.clone(),
            events: sender,
        };

        Self {
            auth: Auth::new(&database, &clock, &config),
            quota: QuotaTracker,
            rooms: RoomRegistry::new(&config),
            ledger: QueueLedger::default(),
            skips: SkipConsensus::new(&config),
            dispatcher: Dispatcher,
            context,
            catalog,
            events: receiver,
        }
    }

    pub fn context(&self) -> &CollabContext<Db> {
        &self.context
    }

    /// A receiver for events of committed operations
    pub fn events(&self) -> EventReceiver {
        self.events.clone()
    }

    pub async fn authenticate(&self, credential: &str) -> CollabResult<Identity> {
        Ok(self.auth.authenticate(credential).await?)
    }

    pub async fn create_room(&self, credential: &str, name: &str) -> CollabResult<RoomData> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        let room = self.rooms.create_room(&mut op, &identity, name).await?;
        op.commit().await?;

        Ok(room)
    }

    pub async fn join_room(&self, credential: &str, code: &str) -> CollabResult<RoomData> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        let room = self.rooms.join_room(&mut op, &identity, code).await?;
        op.commit().await?;

        Ok(room)
    }

    pub async fn leave_room(&self, credential: &str, room_id: PrimaryKey) -> CollabResult<()> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        self.rooms.leave_room(&mut op, &identity, room_id).await?;
        op.commit().await
    }

    pub async fn room_snapshot(
        &self,
        credential: &str,
        room_id: PrimaryKey,
    ) -> CollabResult<RoomSnapshot> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        let snapshot = RoomSnapshot::read(&mut op, &identity, room_id, &self.skips).await?;
        op.commit().await?;

        Ok(snapshot)
    }

    pub async fn enqueue_track(
        &self,
        credential: &str,
        room_id: PrimaryKey,
        track: TrackInfo,
    ) -> CollabResult<QueueItemData> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        let item = self
            .ledger
            .enqueue(&mut op, &identity, room_id, track)
            .await?;
        op.commit().await?;

        Ok(item)
    }

    /// Votes "up" or "down" on a queued item
    pub async fn cast_queue_vote(
        &self,
        credential: &str,
        item_id: PrimaryKey,
        direction: &str,
    ) -> CollabResult<VoteResult> {
        let identity = self.authenticate(credential).await?;
        let direction: VoteDirection = direction
            .parse()
            .map_err(|_| InvalidVote::UnknownDirection(direction.to_string()))?;

        let mut op = Operation::begin(&self.context).await?;

        let result = self
            .ledger
            .cast_vote(&mut op, &identity, item_id, direction)
            .await?;
        op.commit().await?;

        Ok(result)
    }

    pub async fn cast_skip_vote(
        &self,
        credential: &str,
        room_id: PrimaryKey,
        item_id: PrimaryKey,
    ) -> CollabResult<SkipDecision> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        let decision = self
            .skips
            .cast_skip_vote(&mut op, &identity, room_id, item_id)
            .await?;
        op.commit().await?;

        Ok(decision)
    }

    pub async fn advance_playback(
        &self,
        credential: &str,
        room_id: PrimaryKey,
    ) -> CollabResult<Advance> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        let advance = self.dispatcher.advance(&mut op, &identity, room_id).await?;
        op.commit().await?;

        Ok(advance)
    }

    /// Today's counters of the caller, next to their tier's limits
    pub async fn usage(&self, credential: &str) -> CollabResult<UsageReport> {
        let identity = self.authenticate(credential).await?;
        let mut op = Operation::begin(&self.context).await?;

        let report = self.quota.report(&mut op, &identity).await?;
        op.commit().await?;

        Ok(report)
    }

    pub async fn search_tracks(
        &self,
        credential: &str,
        query: &str,
    ) -> CollabResult<Vec<TrackInfo>> {
        self.authenticate(credential).await?;

        let query = query.trim();
        if query.is_empty() {
            return Err(CollabError::InvalidInput("Search query required".into()));
        }

        Ok(self.catalog.search(query).await?)
    }
}

impl<Db> Clone for CollabContext<Db> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
            events: self.events.clone(),
        }
    }
}
