//! Storage contracts for identity records and refresh tokens
//!
//! Every backend reports a missing record as `RepositoryError::NotFound` so the
//! service layer can translate it without knowing the backend's native signal.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::{RepositoryResult, User};

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Session store error: {0}")]
    SessionStore(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound)
    }
}

/// Durable storage of identity records
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a live user by username
    async fn get_by_username(&self, username: &str) -> RepositoryResult<User>;

    /// Find a live user by ID
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<User>;

    /// List every live user
    async fn get_all(&self) -> RepositoryResult<Vec<User>>;

    /// Persist a new user.
    /// Fails with `UniqueViolation` when the username is taken.
    async fn create(&self, user: User) -> RepositoryResult<User>;

    /// Replace the stored fields of an existing user
    async fn update(&self, user: User) -> RepositoryResult<User>;

    /// Delete a user. Returns whether a live record was removed.
    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// Ephemeral storage of refresh-token digests, one per user
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Store the digest of a user's current refresh token, replacing any previous one
    async fn save_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        ttl: Duration,
    ) -> RepositoryResult<()>;

    /// Fetch the stored digest, if any
    async fn get_refresh_token(&self, user_id: Uuid) -> RepositoryResult<Option<String>>;

    /// Swap the stored digest for `new_hash` only if it still equals `expected_hash`.
    ///
    /// The comparison and the write happen atomically. Returns `false`, leaving
    /// the store untouched, when no live digest matches.
    async fn replace_refresh_token(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        ttl: Duration,
    ) -> RepositoryResult<bool>;

    /// Remove the user's refresh token. Absence is not an error.
    async fn delete_refresh_token_by_user_id(&self, user_id: Uuid) -> RepositoryResult<()>;
}
