use async_trait::async_trait;
use thiserror::Error;

use crate::models::{LikeRecord, MatchRecord, UserStatus, Versioned};

/// Errors raised by persistence backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a compare-and-swap write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write landed; carries the new version
    Applied(u64),
    /// The stored version moved since it was read
    Conflict,
}

/// Outcome of a create-if-absent insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    AlreadyExists,
}

/// Quota status persistence.
///
/// A status is written only through `compare_and_swap_status`; `expected`
/// is the version returned by the last read, or `None` when the caller saw
/// no record. Backends must reject the write when the stored version differs
/// (or a record appeared) instead of overwriting it.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn load_status(&self, user_id: &str) -> Result<Option<Versioned<UserStatus>>, StoreError>;

    async fn compare_and_swap_status(
        &self,
        user_id: &str,
        expected: Option<u64>,
        status: &UserStatus,
    ) -> Result<CasOutcome, StoreError>;
}

/// Like and match persistence.
///
/// Both inserts are create-if-absent: an existing record is left untouched
/// and reported as `InsertOutcome::AlreadyExists`.
#[async_trait]
pub trait LikeStore: Send + Sync {
    async fn insert_like(&self, like: &LikeRecord) -> Result<InsertOutcome, StoreError>;

    async fn like_exists(&self, liker: &str, liked: &str) -> Result<bool, StoreError>;

    async fn insert_match(&self, record: &MatchRecord) -> Result<InsertOutcome, StoreError>;

    async fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>, StoreError>;

    /// All matches the user participates in, oldest first
    async fn list_matches(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError>;
}
