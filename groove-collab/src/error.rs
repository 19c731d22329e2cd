use groove_core::CounterKind;
use thiserror::Error;

use crate::{AuthError, CatalogError, DatabaseError};

pub type CollabResult<T> = Result<T, CollabError>;

/// Everything an engine operation can fail with
#[derive(Debug, Error)]
pub enum CollabError {
    /// The credential is missing, unknown or expired
    #[error("Not authenticated")]
    Unauthenticated,
    /// Authenticated, but not allowed to do this
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),
    /// The resource doesn't exist, or the room is no longer active
    #[error("{resource} with {identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("Daily limit of {limit} {kind} reached ({used} used)")]
    QuotaExceeded {
        kind: CounterKind,
        limit: u32,
        used: u32,
    },
    /// The room is full for the joining user's tier
    #[error("Room is full (capacity {capacity})")]
    CapacityExceeded { capacity: u32 },
    #[error(transparent)]
    InvalidVote(#[from] InvalidVote),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A concurrent operation got in the way. Retrying re-reads fresh state.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a vote was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidVote {
    /// The item has already been played or removed
    #[error("Item is no longer in the queue")]
    Stale,
    /// Skip votes only apply to the item that is playing
    #[error("Item is not playing")]
    NotPlaying,
    #[error("Unknown vote direction {0:?}")]
    UnknownDirection(String),
}

impl CollabError {
    pub(crate) fn not_found(resource: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            resource,
            identifier: identifier.to_string(),
        }
    }

    /// Returns true if the caller may retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<DatabaseError> for CollabError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::not_found(resource, identifier),
            DatabaseError::Contention => Self::Conflict(error.to_string()),
            DatabaseError::Conflict { .. } => Self::Conflict(error.to_string()),
            DatabaseError::Internal(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for CollabError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials | AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::Conflict(username) => {
                Self::InvalidInput(format!("Username {username} is taken"))
            }
            AuthError::Invalid(reason) => Self::InvalidInput(reason.to_string()),
            AuthError::Db(e) => e.into(),
            AuthError::HashError(e) => Self::Internal(e),
        }
    }
}
