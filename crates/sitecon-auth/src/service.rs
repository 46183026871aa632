//! Identity service
//!
//! Owns every decision about whether a user record may be created, changed or
//! destroyed. Username uniqueness is checked up front but enforced by the
//! repository; the up-front check only gives a cheaper, earlier error.

use sitecon_core::{RefreshTokenStore, RepositoryError, User, UserRepository};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, instrument, Instrument, Span};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{CreateUserInput, UpdateUserInput};
use crate::password::Argon2Hasher;

/// User account lifecycle service
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn RefreshTokenStore>,
    hasher: Argon2Hasher,
    span: Span,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn RefreshTokenStore>,
        hasher: Argon2Hasher,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            span: info_span!("user_service"),
        }
    }

    /// Parent span for every operation of this service
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Register a new user
    ///
    /// # Returns
    ///
    /// * `Ok(User)` - Newly created user
    /// * `Err(ServiceError::UserAlreadyExists)` - If the username is taken
    /// * `Err(ServiceError::InvalidCredential)` - If the password is empty
    #[instrument(parent = &self.span, skip_all, fields(username = %input.username))]
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, ServiceError> {
        match self.users.get_by_username(&input.username).await {
            Ok(_) => return Err(ServiceError::UserAlreadyExists),
            Err(RepositoryError::NotFound) => {}
            Err(e) => return Err(ServiceError::repository("check existing user", e)),
        }

        let password_hash = self.hasher.hash_blocking(input.password).await.map_err(|e| {
            error!(error = %e, "Failed to hash password");
            ServiceError::from(e)
        })?;

        let created = self
            .users
            .create(User::new(input.username, input.name, password_hash))
            .await
            .map_err(|e| match e {
                RepositoryError::UniqueViolation(_) => ServiceError::UserAlreadyExists,
                other => ServiceError::repository("create user", other),
            })?;

        info!(
            user_id = %created.id,
            username = %created.username,
            name = %created.name,
            "User created"
        );
        Ok(created)
    }

    /// List every live user
    #[instrument(parent = &self.span, skip_all)]
    pub async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        self.users
            .get_all()
            .await
            .map_err(|e| ServiceError::repository("list users", e))
    }

    #[instrument(parent = &self.span, skip_all, fields(user_id = %id))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<User, ServiceError> {
        self.users.get_by_id(id).await.map_err(|e| match e {
            RepositoryError::NotFound => ServiceError::UserNotFound,
            other => ServiceError::repository("get user by id", other),
        })
    }

    #[instrument(parent = &self.span, skip_all, fields(username = %username))]
    pub async fn get_by_username(&self, username: &str) -> Result<User, ServiceError> {
        self.users.get_by_username(username).await.map_err(|e| match e {
            RepositoryError::NotFound => ServiceError::UserNotFound,
            other => ServiceError::repository("get user by username", other),
        })
    }

    /// Apply a partial update
    ///
    /// Only fields present in `input` change. A new password is re-hashed.
    #[instrument(parent = &self.span, skip_all, fields(user_id = %id))]
    pub async fn update_user(&self, id: Uuid, input: UpdateUserInput) -> Result<User, ServiceError> {
        let mut user = self.users.get_by_id(id).await.map_err(|e| match e {
            RepositoryError::NotFound => ServiceError::UserNotFound,
            other => ServiceError::repository("update user", other),
        })?;

        if input.is_empty() {
            debug!("Empty update, nothing to persist");
            return Ok(user);
        }

        if let Some(name) = input.name {
            user.name = name;
        }
        if let Some(username) = input.username {
            user.username = username;
        }
        if let Some(password) = input.password {
            user.password_hash = self.hasher.hash_blocking(password).await.map_err(|e| {
                error!(error = %e, "Failed to hash password");
                ServiceError::from(e)
            })?;
        }
        user.touch();

        let updated = self.users.update(user).await.map_err(|e| match e {
            RepositoryError::NotFound => ServiceError::UserNotFound,
            RepositoryError::UniqueViolation(_) => ServiceError::UserAlreadyExists,
            other => ServiceError::repository("update user", other),
        })?;

        info!(
            username = %updated.username,
            name = %updated.name,
            "User updated"
        );
        Ok(updated)
    }

    /// Delete a user and then its refresh token
    ///
    /// The two stores are not updated atomically. If the user record is removed
    /// but the refresh token cannot be, the result is
    /// `ServiceError::SessionCleanupFailed`: the account is gone and the
    /// leftover session entry must be reconciled externally. Deleting a user
    /// that no longer exists still runs the cleanup and succeeds.
    ///
    /// Both steps run on a spawned task, so dropping the returned future (a
    /// timeout, a cancelled command) never stops the cleanup half way.
    #[instrument(parent = &self.span, skip_all, fields(user_id = %id))]
    pub async fn delete_user(&self, id: Uuid) -> Result<(), ServiceError> {
        let cascade = delete_cascade(
            Arc::clone(&self.users),
            Arc::clone(&self.sessions),
            id,
        );
        tokio::spawn(cascade.in_current_span()).await?
    }
}

async fn delete_cascade(
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn RefreshTokenStore>,
    id: Uuid,
) -> Result<(), ServiceError> {
    let removed = match users.delete(id).await {
        Ok(removed) => removed,
        Err(RepositoryError::NotFound) => false,
        Err(e) => return Err(ServiceError::repository("delete user", e)),
    };

    if !removed {
        debug!("No live user record, cleaning up refresh token only");
    }

    if let Err(source) = sessions.delete_refresh_token_by_user_id(id).await {
        error!(
            error = %source,
            "User deleted but refresh token cleanup failed; session entry needs reconciliation"
        );
        return Err(ServiceError::SessionCleanupFailed { user_id: id, source });
    }

    info!(removed, "User deleted");
    Ok(())
}
