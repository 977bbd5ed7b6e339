//! Job handler errors.

use thiserror::Error;

use crate::repository::DbError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum JobError {
    /// Retrying cannot help (bad payload, missing rows).
    #[error("{0}")]
    Permanent(String),
    /// Worth retrying with backoff (network, storage, busy database).
    #[error("{0}")]
    Transient(String),
}

impl JobError {
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

impl From<DbError> for JobError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Self::Permanent("record not found".to_string()),
            other => Self::Transient(format!("database error: {}", other)),
        }
    }
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::Permanent(format!("object {} not found", key)),
            StorageError::InvalidKey(key) => Self::Permanent(format!("invalid object key {}", key)),
            other => Self::Transient(format!("storage error: {}", other)),
        }
    }
}
