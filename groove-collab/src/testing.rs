use std::sync::Arc;

use chrono::{TimeZone, Utc};
use groove_core::{Clock, Config, ManualClock, Tier};

use crate::{
    Collab, Credentials, MemoryDatabase, NewPlainUser, PrimaryKey, StaticCatalog, TrackInfo,
};

/// A collab system on the memory database, with a clock tests can move
pub struct Harness {
    pub collab: Collab<MemoryDatabase>,
    pub clock: Arc<ManualClock>,
}

pub struct TestUser {
    pub id: PrimaryKey,
    pub token: String,
}

impl Harness {
    pub fn new() -> Self {
        // Friday evening, 20:00 UTC
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 7, 20, 0, 0).unwrap(),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let catalog = StaticCatalog::new(vec![track("Around the World"), track("Harder")]);
        let collab = Collab::with_clock(
            MemoryDatabase::new(),
            Arc::new(catalog),
            Config::default(),
            dyn_clock,
        );

        Self { collab, clock }
    }

    /// Registers and logs in a user on the given tier
    pub async fn user(&self, username: &str, tier: Tier) -> TestUser {
        let user = self
            .collab
            .auth
            .register(NewPlainUser {
                username: username.to_string(),
                password: "hunter22".to_string(),
                display_name: username.to_string(),
            })
            .await
            .unwrap();

        self.collab.auth.set_tier(user.id, tier).await.unwrap();

        let session = self
            .collab
            .auth
            .login(Credentials {
                username: username.to_string(),
                password: "hunter22".to_string(),
            })
            .await
            .unwrap();

        TestUser {
            id: user.id,
            token: session.token,
        }
    }

    /// Creates a room hosted by `host` and has everyone else join it
    pub async fn room(&self, host: &TestUser, others: &[&TestUser]) -> PrimaryKey {
        let room = self
            .collab
            .create_room(&host.token, "Friday night")
            .await
            .unwrap();

        for user in others {
            self.collab.join_room(&user.token, &room.code).await.unwrap();
        }

        room.id
    }

    pub async fn enqueue(&self, user: &TestUser, room_id: PrimaryKey, title: &str) -> PrimaryKey {
        self.collab
            .enqueue_track(&user.token, room_id, track(title))
            .await
            .unwrap()
            .id
    }

    /// Titles of the live queue in play order, as `user` sees it
    pub async fn queue(&self, user: &TestUser, room_id: PrimaryKey) -> Vec<String> {
        self.collab
            .room_snapshot(&user.token, room_id)
            .await
            .unwrap()
            .queue
            .into_iter()
            .map(|e| e.item.track.title)
            .collect()
    }
}

pub fn track(title: &str) -> TrackInfo {
    TrackInfo {
        track_ref: format!("spotify:{}", title.to_lowercase().replace(' ', "-")),
        title: title.to_string(),
        artist: "Daft Punk".to_string(),
        album: Some("Homework".to_string()),
        artwork_url: None,
        preview_url: None,
        duration_ms: Some(240_000),
    }
}
