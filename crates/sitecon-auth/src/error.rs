//! Service error taxonomy
//!
//! Repository errors are translated here: a store's not-found becomes
//! `UserNotFound`, a uniqueness violation becomes `UserAlreadyExists`, and
//! everything else is wrapped with the name of the failing operation.

use sitecon_core::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

use crate::jwt::TokenError;
use crate::password::PasswordError;

/// Errors returned by the identity and session services
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("User not found")]
    UserNotFound,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Invalid credential: {0}")]
    InvalidCredential(#[source] PasswordError),

    #[error("Invalid username or password")]
    AuthenticationFailed,

    #[error("Token is invalid")]
    TokenInvalid,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Failed to {operation}: {source}")]
    Repository {
        operation: &'static str,
        #[source]
        source: RepositoryError,
    },

    /// The user record is gone but its refresh token could not be removed
    #[error("User {user_id} deleted but refresh token cleanup failed: {source}")]
    SessionCleanupFailed {
        user_id: Uuid,
        #[source]
        source: RepositoryError,
    },

    #[error("Password hashing error: {0}")]
    Password(#[source] PasswordError),

    #[error("Token signing error: {0}")]
    Token(#[source] TokenError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServiceError {
    pub(crate) fn repository(operation: &'static str, source: RepositoryError) -> Self {
        ServiceError::Repository { operation, source }
    }

    /// True for store or crypto failures unrelated to domain rules
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ServiceError::Repository { .. }
                | ServiceError::SessionCleanupFailed { .. }
                | ServiceError::Password(_)
                | ServiceError::Token(_)
                | ServiceError::Task(_)
        )
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::EmptyInput => ServiceError::InvalidCredential(err),
            other => ServiceError::Password(other),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => ServiceError::TokenInvalid,
            TokenError::Expired => ServiceError::TokenExpired,
            other => ServiceError::Token(other),
        }
    }
}
