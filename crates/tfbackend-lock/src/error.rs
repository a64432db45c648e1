use std::time::Duration;

use tfbackend_domain::{DomainError, StateId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("no lock held for state {0}")]
    NotFound(StateId),

    #[error("stored lock for state {id} is unreadable: {reason}")]
    Corrupt { id: StateId, reason: String },

    #[error("invalid locker configuration: {0}")]
    Config(String),

    #[error("lock backend error: {0}")]
    Backend(String),

    #[error("lock backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("meta-mutex {key} not acquired after {tries} attempt(s)")]
    MutexUnavailable { key: String, tries: u32 },

    #[error("{operation}; releasing the meta-mutex also failed: {release}")]
    Joined {
        operation: Box<LockError>,
        release: Box<LockError>,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LockError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LockError::NotFound(_))
    }
}

impl From<sqlx::Error> for LockError {
    fn from(e: sqlx::Error) -> Self {
        LockError::Backend(format!("postgres: {e}"))
    }
}

impl From<redis::RedisError> for LockError {
    fn from(e: redis::RedisError) -> Self {
        LockError::Backend(format!("redis: {e}"))
    }
}
