use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use chrono::Duration;
use groove_core::{Clock, Config, Tier};
use log::info;
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    util::random_string, Database, DatabaseError, NewSession, NewUser, PrimaryKey, SessionData,
    UpdatedUser, UserData,
};

pub struct Auth<Db> {
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
    argon: Argon2<'static>,
    session_duration: Duration,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The session doesn't exist or has expired
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("Username {0} is taken")]
    Conflict(String),
    #[error("{0}")]
    Invalid(&'static str),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

/// The user behind a credential, resolved once per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: PrimaryKey,
    pub tier: Tier,
}

/// Resolves bearer credentials to identities
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError>;
}

impl<Db> Auth<Db>
where
    Db: Database,
{
    const MIN_PASSWORD_LENGTH: usize = 6;
    const MAX_DISPLAY_NAME_LENGTH: usize = 64;
    const TOKEN_LENGTH: usize = 32;

    pub fn new(db: &Arc<Db>, clock: &Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            db: db.clone(),
            clock: clock.clone(),
            argon: Argon2::default(),
            session_duration: Duration::days(config.session_duration_in_days),
        }
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await.map_err(AuthError::Db)?;

        let username = credentials.username.trim().to_lowercase();
        let user = self
            .db
            .user_by_username(&username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let new_session = NewSession {
            token: random_string(Self::TOKEN_LENGTH),
            user_id: user.id,
            expires_at: self.clock.now() + self.session_duration,
        };

        self.db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        match self.db.delete_session_by_token(token).await {
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            result => result,
        }
    }

    /// Creates a free user
    pub async fn register(&self, new_user: NewPlainUser) -> Result<UserData, AuthError> {
        let username = new_user.username.trim().to_lowercase();
        let display_name = Self::display_name(&new_user.display_name)?;

        if username.is_empty() {
            return Err(AuthError::Invalid("Username and display name required"));
        }

        if new_user.password.chars().count() < Self::MIN_PASSWORD_LENGTH {
            return Err(AuthError::Invalid("Password must be at least 6 characters"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        let user = self
            .db
            .create_user(NewUser {
                username,
                password: hashed_password,
                display_name,
                tier: Tier::Free,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { value, .. } => AuthError::Conflict(value),
                err => AuthError::Db(err),
            })?;

        info!("Registered user {}", user.username);
        Ok(user)
    }

    /// Changes the name other room members see
    pub async fn update_profile(
        &self,
        user_id: PrimaryKey,
        display_name: &str,
    ) -> Result<UserData, AuthError> {
        let display_name = Self::display_name(display_name)?;

        let user = self
            .db
            .update_user(UpdatedUser {
                id: user_id,
                display_name: Some(display_name),
                ..Default::default()
            })
            .await
            .map_err(AuthError::Db)?;

        info!("User {} is now shown as {}", user.username, user.display_name);
        Ok(user)
    }

    fn display_name(raw: &str) -> Result<String, AuthError> {
        let display_name = raw.trim();

        if display_name.is_empty() {
            return Err(AuthError::Invalid("Username and display name required"));
        }

        if display_name.chars().count() > Self::MAX_DISPLAY_NAME_LENGTH {
            return Err(AuthError::Invalid("Display name is too long"));
        }

        Ok(display_name.to_string())
    }

    /// Moves a user to another tier. Existing votes keep the weight they were cast with.
    pub async fn set_tier(&self, user_id: PrimaryKey, tier: Tier) -> Result<UserData, DatabaseError> {
        let user = self
            .db
            .update_user(UpdatedUser {
                id: user_id,
                tier: Some(tier),
                ..Default::default()
            })
            .await?;

        info!("User {} is now on the {} tier", user.username, tier);
        Ok(user)
    }

    /// Returns a session if it exists
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        self.db.session_by_token(token).await
    }

    /// Removes sessions that have expired, returning how many
    pub async fn clear_expired(&self) -> Result<u64, DatabaseError> {
        self.db.clear_expired_sessions(self.clock.now()).await
    }
}

#[async_trait]
impl<Db> SessionService for Auth<Db>
where
    Db: Database,
{
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();

        let session = self.db.session_by_token(token).await.map_err(|e| match e {
            DatabaseError::NotFound { .. } => AuthError::Unauthenticated,
            err => AuthError::Db(err),
        })?;

        if session.expires_at <= self.clock.now() {
            return Err(AuthError::Unauthenticated);
        }

        Ok(Identity {
            user_id: session.user.id,
            tier: session.user.tier,
        })
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewPlainUser {
    pub username: String,
    pub password: String,
    pub display_name: String,
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use groove_core::{Clock, Config, ManualClock, Tier};

    use super::{Auth, AuthError, Credentials, NewPlainUser, SessionService};
    use crate::MemoryDatabase;

    fn setup() -> (Auth<MemoryDatabase>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let db = Arc::new(MemoryDatabase::new());

        (Auth::new(&db, &dyn_clock, &Config::default()), clock)
    }

    fn ada() -> NewPlainUser {
        NewPlainUser {
            username: " Ada ".to_string(),
            password: "lovelace".to_string(),
            display_name: "Ada".to_string(),
        }
    }

    #[tokio::test]
    async fn login_and_authenticate() {
        let (auth, _) = setup();
        let user = auth.register(ada()).await.unwrap();

        assert_eq!(user.username, "ada");
        assert_eq!(user.tier, Tier::Free);

        let session = auth
            .login(Credentials {
                username: "ADA".to_string(),
                password: "lovelace".to_string(),
            })
            .await
            .unwrap();

        let identity = auth
            .authenticate(&format!("Bearer {}", session.token))
            .await
            .unwrap();

        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.tier, Tier::Free);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (auth, _) = setup();
        auth.register(ada()).await.unwrap();

        let result = auth
            .login(Credentials {
                username: "ada".to_string(),
                password: "babbage".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn duplicate_and_short_registrations_fail() {
        let (auth, _) = setup();
        auth.register(ada()).await.unwrap();

        assert!(matches!(
            auth.register(ada()).await,
            Err(AuthError::Conflict(_))
        ));

        let short = NewPlainUser {
            password: "12345".to_string(),
            username: "bob".to_string(),
            ..ada()
        };
        assert!(matches!(
            auth.register(short).await,
            Err(AuthError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn sessions_expire() {
        let (auth, clock) = setup();
        auth.register(ada()).await.unwrap();

        let session = auth
            .login(Credentials {
                username: "ada".to_string(),
                password: "lovelace".to_string(),
            })
            .await
            .unwrap();

        clock.advance(Duration::days(8));

        assert!(matches!(
            auth.authenticate(&session.token).await,
            Err(AuthError::Unauthenticated)
        ));
        assert_eq!(auth.clear_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn tier_changes_apply_to_new_authentications() {
        let (auth, _) = setup();
        let user = auth.register(ada()).await.unwrap();
        let session = auth
            .login(Credentials {
                username: "ada".to_string(),
                password: "lovelace".to_string(),
            })
            .await
            .unwrap();

        auth.set_tier(user.id, Tier::Venue).await.unwrap();

        let identity = auth.authenticate(&session.token).await.unwrap();
        assert_eq!(identity.tier, Tier::Venue);
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let (auth, _) = setup();
        auth.register(ada()).await.unwrap();

        let session = auth
            .login(Credentials {
                username: "ada".to_string(),
                password: "lovelace".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(auth.session(&session.token).await.unwrap().user.username, "ada");

        auth.logout(&session.token).await.unwrap();
        assert!(auth.session(&session.token).await.is_err());

        // Logging out twice is fine
        auth.logout(&session.token).await.unwrap();
        assert!(matches!(
            auth.authenticate(&session.token).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn display_names_can_be_changed() {
        let (auth, _) = setup();
        let user = auth.register(ada()).await.unwrap();

        let renamed = auth.update_profile(user.id, "  Countess  ").await.unwrap();
        assert_eq!(renamed.display_name, "Countess");
        assert_eq!(renamed.username, "ada");

        let too_long = "x".repeat(65);
        for bad in ["   ", too_long.as_str()] {
            assert!(matches!(
                auth.update_profile(user.id, bad).await,
                Err(AuthError::Invalid(_))
            ));
        }

        assert!(auth.update_profile(user.id, &"x".repeat(64)).await.is_ok());
        assert!(matches!(
            auth.update_profile(user.id + 1, "Nobody").await,
            Err(AuthError::Db(_))
        ));
    }
}
