//! Service wiring
//!
//! Builds the identity and session services over one pair of stores and one
//! immutable configuration.

use sitecon_core::{AppConfig, RefreshTokenStore, UserRepository};
use std::sync::Arc;

use crate::jwt::TokenIssuer;
use crate::password::{Argon2Hasher, PasswordError};
use crate::service::UserService;
use crate::session::SessionService;

/// Services shared by every caller
#[derive(Clone)]
pub struct AuthState {
    pub users: UserService,
    pub sessions: SessionService,
}

impl AuthState {
    /// Create the services from configuration and store handles
    pub fn new(
        config: &AppConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn RefreshTokenStore>,
    ) -> Result<Self, PasswordError> {
        let hasher = Argon2Hasher::new(&config.password)?;
        let issuer = Arc::new(TokenIssuer::from_config(&config.tokens));

        Ok(Self {
            users: UserService::new(users.clone(), sessions.clone(), hasher.clone()),
            sessions: SessionService::new(users, sessions, hasher, issuer),
        })
    }
}
