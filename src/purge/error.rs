use std::time::Duration;
use thiserror::Error;

use crate::database::manager::DatabaseError;

/// Outcome of a purge request that did not produce a summary
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("Legacy user {0} not found")]
    NotFound(i64),

    #[error("Legacy user {0} is already being purged")]
    InProgress(i64),

    /// The transaction was rolled back; nothing changed
    #[error("Purge of legacy user {user_id} failed, nothing was changed: {reason}")]
    Fatal { user_id: i64, reason: FatalReason },
}

#[derive(Debug, Error)]
pub enum FatalReason {
    #[error("existence check failed: {0}")]
    Lookup(DatabaseError),

    #[error("could not start transaction: {0}")]
    Begin(DatabaseError),

    #[error("could not lock user: {0}")]
    Lock(DatabaseError),

    #[error("root delete failed: {0}")]
    DeleteRoot(DatabaseError),

    #[error("commit failed: {0}")]
    Commit(DatabaseError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl PurgeError {
    pub fn fatal(user_id: i64, reason: FatalReason) -> Self {
        PurgeError::Fatal { user_id, reason }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, PurgeError::Fatal { .. })
    }
}
