use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use groove_core::{
    CounterKind, Limit, PlayedCause, QueueItemState, QuotaDecision, Tier, Usage, VoteDirection,
};
use log::warn;
use sqlx::{
    postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, FromRow, PgPool,
    Postgres, Transaction as SqlxTransaction,
};

use crate::{
    BoxedTransaction, Database, DatabaseError, DatabaseResult, IntoDatabaseError, NewQueueItem,
    NewRoom, NewRoomMember, NewSession, NewSkipVote, NewUser, NewVote, PrimaryKey,
    QueueItemData, Result, RoomData, RoomMemberData, SessionData, TrackInfo, Transaction,
    UpdatedUser, UserData, VoteData,
};

/// A postgres database implementation for groove
pub struct PgDatabase {
    pool: PgPool,
}

/// A transaction on [PgDatabase]. Rooms are read with `FOR UPDATE`.
pub struct PgTransaction {
    tx: SqlxTransaction<'static, Postgres>,
}

impl PgDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Applies pending migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    password: String,
    display_name: String,
    tier: String,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    password: String,
    display_name: String,
    tier: String,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    code: String,
    name: String,
    host_id: PrimaryKey,
    active: bool,
    now_playing_id: Option<PrimaryKey>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MemberRow {
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    username: String,
    display_name: String,
    is_dj: bool,
    joined_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct QueueItemRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    added_by: PrimaryKey,
    track_ref: String,
    title: String,
    artist: String,
    album: Option<String>,
    artwork_url: Option<String>,
    preview_url: Option<String>,
    duration_ms: Option<i32>,
    created_at: DateTime<Utc>,
    played_at: Option<DateTime<Utc>>,
    played_cause: Option<String>,
}

#[derive(FromRow)]
struct VoteRow {
    queue_item_id: PrimaryKey,
    user_id: PrimaryKey,
    direction: String,
    weight: i32,
}

#[derive(FromRow)]
struct UsageRow {
    song_requests: i32,
    votes_cast: i32,
    rooms_created: i32,
}

const USER_COLUMNS: &str = "id, username, password, display_name, tier";

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, password, display_name, tier)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.password)
        .bind(&new_user.display_name)
        .bind(new_user.tier.as_str())
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.unique_or_any("user", "username", &new_user.username))
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let user = self.user_by_id(updated_user.id).await?;

        query("UPDATE users SET display_name = $1, tier = $2 WHERE id = $3")
            .bind(updated_user.display_name.unwrap_or(user.display_name))
            .bind(updated_user.tier.unwrap_or(user.tier).as_str())
            .bind(updated_user.id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.user_by_id(updated_user.id).await
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query_as::<_, SessionRow>(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.password,
                users.display_name,
                users.tier
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                password: row.password,
                display_name: row.display_name,
                tier: parse_tier(&row.tier),
            },
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let token: String = query_scalar(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3) RETURNING token",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.session_by_token(&token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|r| r.rows_affected())
    }

    async fn begin(&self) -> Result<BoxedTransaction<'_>> {
        let tx = self.pool.begin().await.map_err(|e| e.any())?;

        Ok(Box::new(PgTransaction { tx }))
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn room_by_id(&mut self, room_id: PrimaryKey) -> Result<RoomData> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_one(&mut *self.tx)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn active_room_by_code(&mut self, code: &str) -> Result<RoomData> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE code = $1 AND active FOR UPDATE")
            .bind(code)
            .fetch_one(&mut *self.tx)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("room", "code"))
    }

    async fn create_room(&mut self, new_room: NewRoom) -> Result<RoomData> {
        query_as::<_, RoomRow>(
            "INSERT INTO rooms (code, name, host_id, active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING *",
        )
        .bind(&new_room.code)
        .bind(&new_room.name)
        .bind(new_room.host_id)
        .bind(new_room.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map(Into::into)
        .map_err(|e| e.unique_or_any("room", "code", &new_room.code))
    }

    async fn close_room(&mut self, room_id: PrimaryKey) -> Result<()> {
        let result = query("UPDATE rooms SET active = FALSE WHERE id = $1")
            .bind(room_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            });
        }

        Ok(())
    }

    async fn set_now_playing(
        &mut self,
        room_id: PrimaryKey,
        item_id: Option<PrimaryKey>,
    ) -> Result<()> {
        query("UPDATE rooms SET now_playing_id = $1 WHERE id = $2")
            .bind(item_id)
            .bind(room_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_members(&mut self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>> {
        let rows = query_as::<_, MemberRow>(
            "SELECT
                room_members.room_id,
                room_members.user_id,
                users.username,
                users.display_name,
                room_members.is_dj,
                room_members.joined_at
            FROM room_members
                INNER JOIN users ON room_members.user_id = users.id
            WHERE room_id = $1
            ORDER BY room_members.joined_at, room_members.user_id",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_room_member(&mut self, new_member: NewRoomMember) -> Result<bool> {
        query(
            "INSERT INTO room_members (room_id, user_id, is_dj, joined_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (room_id, user_id) DO NOTHING",
        )
        .bind(new_member.room_id)
        .bind(new_member.user_id)
        .bind(new_member.is_dj)
        .bind(new_member.joined_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| e.any())
        .map(|r| r.rows_affected() > 0)
    }

    async fn delete_room_member(
        &mut self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<bool> {
        query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())
            .map(|r| r.rows_affected() > 0)
    }

    async fn usage(&mut self, user_id: PrimaryKey, day: NaiveDate) -> Result<Usage> {
        let row = query_as::<_, UsageRow>(
            "SELECT song_requests, votes_cast, rooms_created
            FROM usage_counters
            WHERE user_id = $1 AND day = $2",
        )
        .bind(user_id)
        .bind(day)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| e.any())?;

        Ok(row.map(Into::into).unwrap_or_default())
    }

    async fn increment_usage(
        &mut self,
        user_id: PrimaryKey,
        day: NaiveDate,
        kind: CounterKind,
        limit: Limit,
    ) -> Result<QuotaDecision> {
        let column = kind.column();

        // A fresh row starts at one, which would slip past a zero limit
        if limit == Limit::Max(0) {
            let used = self.usage(user_id, day).await?.get(kind);
            return Ok(QuotaDecision::Denied { used, limit: 0 });
        }

        let guard = match limit {
            Limit::Unlimited => String::new(),
            Limit::Max(_) => format!("WHERE usage_counters.{column} < $3"),
        };

        let statement = format!(
            "INSERT INTO usage_counters (user_id, day, {column})
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, day) DO UPDATE
                SET {column} = usage_counters.{column} + 1
                {guard}
            RETURNING {column}"
        );

        let mut incremented = query_scalar::<_, i32>(&statement).bind(user_id).bind(day);
        if let Some(max) = limit.max() {
            incremented = incremented.bind(i32::try_from(max).unwrap_or(i32::MAX));
        }

        let incremented = incremented
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| e.any())?;

        match incremented {
            Some(used) => Ok(QuotaDecision::Allowed {
                used: to_count(used),
                limit,
            }),
            None => {
                let used = self.usage(user_id, day).await?.get(kind);

                Ok(QuotaDecision::Denied {
                    used,
                    limit: limit.max().unwrap_or_default(),
                })
            }
        }
    }

    async fn create_queue_item(&mut self, new_item: NewQueueItem) -> Result<QueueItemData> {
        let track = new_item.track;

        let row = query_as::<_, QueueItemRow>(
            "INSERT INTO queue_items (
                room_id, added_by, track_ref, title, artist,
                album, artwork_url, preview_url, duration_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *",
        )
        .bind(new_item.room_id)
        .bind(new_item.added_by)
        .bind(track.track_ref)
        .bind(track.title)
        .bind(track.artist)
        .bind(track.album)
        .bind(track.artwork_url)
        .bind(track.preview_url)
        .bind(track.duration_ms.and_then(|d| i32::try_from(d).ok()))
        .bind(new_item.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| e.any())?;

        row.try_into()
    }

    async fn queue_item_by_id(&mut self, item_id: PrimaryKey) -> Result<QueueItemData> {
        query_as::<_, QueueItemRow>("SELECT * FROM queue_items WHERE id = $1")
            .bind(item_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| e.not_found_or("queue item", "id"))?
            .try_into()
    }

    async fn queued_items(&mut self, room_id: PrimaryKey) -> Result<Vec<QueueItemData>> {
        query_as::<_, QueueItemRow>(
            "SELECT * FROM queue_items WHERE room_id = $1 AND played_at IS NULL",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
    }

    async fn mark_played(
        &mut self,
        item_id: PrimaryKey,
        at: DateTime<Utc>,
        cause: PlayedCause,
    ) -> Result<()> {
        query("UPDATE queue_items SET played_at = $1, played_cause = $2 WHERE id = $3")
            .bind(at)
            .bind(cause.as_str())
            .bind(item_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn votes_for_item(&mut self, item_id: PrimaryKey) -> Result<Vec<VoteData>> {
        query_as::<_, VoteRow>(
            "SELECT queue_item_id, user_id, direction, weight FROM votes WHERE queue_item_id = $1",
        )
        .bind(item_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
    }

    async fn votes_for_room(&mut self, room_id: PrimaryKey) -> Result<Vec<VoteData>> {
        query_as::<_, VoteRow>(
            "SELECT votes.queue_item_id, votes.user_id, votes.direction, votes.weight
            FROM votes
                INNER JOIN queue_items ON votes.queue_item_id = queue_items.id
            WHERE queue_items.room_id = $1 AND queue_items.played_at IS NULL",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
    }

    async fn replace_vote(&mut self, new_vote: NewVote) -> Result<()> {
        query("DELETE FROM votes WHERE queue_item_id = $1 AND user_id = $2")
            .bind(new_vote.queue_item_id)
            .bind(new_vote.user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())?;

        query(
            "INSERT INTO votes (queue_item_id, user_id, direction, weight, created_at)
            VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(new_vote.queue_item_id)
        .bind(new_vote.user_id)
        .bind(new_vote.direction.as_str())
        .bind(i32::try_from(new_vote.weight).unwrap_or(i32::MAX))
        .bind(new_vote.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            e.unique_or_any(
                "vote",
                "queue_item:user",
                &format!("{}:{}", new_vote.queue_item_id, new_vote.user_id),
            )
        })
        .map(|_| ())
    }

    async fn clear_votes(&mut self, item_id: PrimaryKey) -> Result<()> {
        query("DELETE FROM votes WHERE queue_item_id = $1")
            .bind(item_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_skip_vote(&mut self, new_skip_vote: NewSkipVote) -> Result<bool> {
        query(
            "INSERT INTO skip_votes (room_id, user_id, queue_item_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING",
        )
        .bind(new_skip_vote.room_id)
        .bind(new_skip_vote.user_id)
        .bind(new_skip_vote.queue_item_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| e.any())
        .map(|r| r.rows_affected() > 0)
    }

    async fn skip_voters(
        &mut self,
        room_id: PrimaryKey,
        item_id: PrimaryKey,
    ) -> Result<Vec<PrimaryKey>> {
        query_scalar("SELECT user_id FROM skip_votes WHERE room_id = $1 AND queue_item_id = $2")
            .bind(room_id)
            .bind(item_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| e.any())
    }

    async fn clear_skip_votes(
        &mut self,
        room_id: PrimaryKey,
        item_id: Option<PrimaryKey>,
    ) -> Result<()> {
        let statement = match item_id {
            Some(item_id) => query(
                "DELETE FROM skip_votes WHERE room_id = $1 AND queue_item_id = $2",
            )
            .bind(room_id)
            .bind(item_id),
            None => query("DELETE FROM skip_votes WHERE room_id = $1").bind(room_id),
        };

        statement
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(|e| e.any())
    }
}

fn parse_tier(tier: &str) -> Tier {
    tier.parse().unwrap_or_else(|e| {
        warn!("{}, treating it as free", e);
        Tier::Free
    })
}

fn to_count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            tier: parse_tier(&row.tier),
            username: row.username,
            password: row.password,
            display_name: row.display_name,
        }
    }
}

impl From<RoomRow> for RoomData {
    fn from(row: RoomRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            host_id: row.host_id,
            active: row.active,
            now_playing: row.now_playing_id,
            created_at: row.created_at,
        }
    }
}

impl From<MemberRow> for RoomMemberData {
    fn from(row: MemberRow) -> Self {
        Self {
            room_id: row.room_id,
            user_id: row.user_id,
            username: row.username,
            display_name: row.display_name,
            is_dj: row.is_dj,
            joined_at: row.joined_at,
        }
    }
}

impl From<UsageRow> for Usage {
    fn from(row: UsageRow) -> Self {
        Self {
            request_count: to_count(row.song_requests),
            vote_count: to_count(row.votes_cast),
            rooms_created_count: to_count(row.rooms_created),
        }
    }
}

impl TryFrom<QueueItemRow> for QueueItemData {
    type Error = DatabaseError;

    fn try_from(row: QueueItemRow) -> Result<Self> {
        let cause = row
            .played_cause
            .as_deref()
            .map(str::parse::<PlayedCause>)
            .transpose()
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self {
            id: row.id,
            room_id: row.room_id,
            added_by: row.added_by,
            track: TrackInfo {
                track_ref: row.track_ref,
                title: row.title,
                artist: row.artist,
                album: row.album,
                artwork_url: row.artwork_url,
                preview_url: row.preview_url,
                duration_ms: row.duration_ms.and_then(|d| u32::try_from(d).ok()),
            },
            created_at: row.created_at,
            state: QueueItemState::from_columns(row.played_at, cause),
        })
    }
}

impl TryFrom<VoteRow> for VoteData {
    type Error = DatabaseError;

    fn try_from(row: VoteRow) -> Result<Self> {
        let direction: VoteDirection = row
            .direction
            .parse()
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self {
            queue_item_id: row.queue_item_id,
            user_id: row.user_id,
            direction,
            weight: u32::try_from(row.weight).unwrap_or(1),
        })
    }
}

/// Postgres codes for transactions aborted by concurrent ones
const CONTENTION_CODES: [&str; 2] = ["40001", "40P01"];
const UNIQUE_VIOLATION_CODE: &str = "23505";

trait PgErrorExt {
    /// Turns unique violations into a conflict error
    fn unique_or_any(self, resource: &'static str, field: &'static str, value: &str)
        -> DatabaseError;
}

impl PgErrorExt for SqlxError {
    fn unique_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError {
        match &self {
            SqlxError::Database(e) if e.code().as_deref() == Some(UNIQUE_VIOLATION_CODE) => {
                DatabaseError::Conflict {
                    resource,
                    field,
                    value: value.to_string(),
                }
            }
            _ => self.any(),
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        match &self {
            SqlxError::Database(e)
                if e
                    .code()
                    .is_some_and(|code| CONTENTION_CODES.contains(&code.as_ref())) =>
            {
                DatabaseError::Contention
            }
            _ => DatabaseError::Internal(Box::new(self)),
        }
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
