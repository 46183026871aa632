//! Session service
//!
//! Issues token pairs at login, rotates them on refresh and revokes them on
//! logout. Only the SHA-256 digest of the current refresh token is stored, one
//! per user, so issuing a new pair revokes the previous refresh token. Rotation
//! is a compare-and-set in the store: of two refreshes presenting the same
//! token, exactly one succeeds.

use sha2::{Digest, Sha256};
use sitecon_core::{RefreshTokenStore, RepositoryError, UserRepository};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, info_span, instrument, warn, Span};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::jwt::{TokenIssuer, TokenKind};
use crate::models::TokenPair;
use crate::password::Argon2Hasher;

/// Verified on unknown-username logins so they cost as much as a wrong password
const DUMMY_PASSWORD: &str = "sitecon-unknown-user";

/// Hash a token for storage (simple SHA-256)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Login, refresh and logout
#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn RefreshTokenStore>,
    hasher: Argon2Hasher,
    issuer: Arc<TokenIssuer>,
    dummy_hash: Arc<OnceCell<String>>,
    span: Span,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn RefreshTokenStore>,
        hasher: Argon2Hasher,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            issuer,
            dummy_hash: Arc::new(OnceCell::new()),
            span: info_span!("session_service"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Authenticate with username and password
    ///
    /// An unknown username and a wrong password are indistinguishable to the
    /// caller: both fail with `AuthenticationFailed`, and both run one Argon2
    /// verification.
    #[instrument(parent = &self.span, skip_all, fields(username = %username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ServiceError> {
        let user = match self.users.get_by_username(username).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound) => {
                self.verify_against_dummy(password).await;
                info!("Login for unknown username");
                return Err(ServiceError::AuthenticationFailed);
            }
            Err(e) => return Err(ServiceError::repository("load user for login", e)),
        };

        let valid = self
            .hasher
            .verify_blocking(password.to_string(), user.password_hash.clone())
            .await?;
        if !valid {
            info!(user_id = %user.id, "Login with wrong password");
            return Err(ServiceError::AuthenticationFailed);
        }

        let pair = self.issue_pair(user.id).await?;
        info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair
    ///
    /// The presented token must verify against the refresh secret and still be
    /// the one on record. The record is swapped for the new token's digest in a
    /// single compare-and-set, so a replayed or concurrently reused token fails
    /// with `TokenInvalid`.
    #[instrument(parent = &self.span, skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let user_id = self.issuer.verify(refresh_token, TokenKind::Refresh)?;

        match self.users.get_by_id(user_id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound) => {
                warn!(%user_id, "Refresh token outlived its user, revoking");
                self.sessions
                    .delete_refresh_token_by_user_id(user_id)
                    .await
                    .map_err(|e| ServiceError::repository("revoke orphaned refresh token", e))?;
                return Err(ServiceError::TokenInvalid);
            }
            Err(e) => return Err(ServiceError::repository("load user for refresh", e)),
        }

        let pair = self.mint_pair(user_id)?;
        let swapped = self
            .sessions
            .replace_refresh_token(
                user_id,
                &hash_token(refresh_token),
                &hash_token(&pair.refresh_token),
                self.issuer.ttl(TokenKind::Refresh),
            )
            .await
            .map_err(|e| ServiceError::repository("rotate refresh token", e))?;

        if !swapped {
            warn!(%user_id, "Refresh token is not the one on record");
            return Err(ServiceError::TokenInvalid);
        }

        info!(%user_id, "Tokens refreshed");
        Ok(pair)
    }

    /// Revoke the user's refresh token. Succeeds when none exists.
    #[instrument(parent = &self.span, skip_all, fields(user_id = %user_id))]
    pub async fn logout(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.sessions
            .delete_refresh_token_by_user_id(user_id)
            .await
            .map_err(|e| ServiceError::repository("revoke refresh token", e))?;

        info!("User logged out");
        Ok(())
    }

    /// Resolve an access token to its user ID
    pub fn authenticate(&self, access_token: &str) -> Result<Uuid, ServiceError> {
        Ok(self.issuer.verify(access_token, TokenKind::Access)?)
    }

    async fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, ServiceError> {
        let pair = self.mint_pair(user_id)?;

        self.sessions
            .save_refresh_token(
                user_id,
                &hash_token(&pair.refresh_token),
                self.issuer.ttl(TokenKind::Refresh),
            )
            .await
            .map_err(|e| ServiceError::repository("store refresh token", e))?;

        Ok(pair)
    }

    fn mint_pair(&self, user_id: Uuid) -> Result<TokenPair, ServiceError> {
        let access_token = self.issuer.issue_access_token(user_id)?;
        let refresh_token = self.issuer.issue_refresh_token(user_id)?;

        Ok(TokenPair::bearer(
            access_token,
            refresh_token,
            self.issuer.ttl(TokenKind::Access).as_secs(),
        ))
    }

    async fn verify_against_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hasher.hash_blocking(DUMMY_PASSWORD.to_string()))
            .await;

        match dummy {
            Ok(hash) => {
                if let Err(e) = self
                    .hasher
                    .verify_blocking(password.to_string(), hash.clone())
                    .await
                {
                    debug!(error = %e, "Dummy password verification failed");
                }
            }
            Err(e) => debug!(error = %e, "Failed to prepare dummy password hash"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::tests::test_issuer;
    use crate::password::tests::test_hasher;
    use sitecon_core::memory::{MemoryRefreshTokenStore, MemoryUserRepository};
    use sitecon_core::User;
    use std::time::{Duration, SystemTime};

    struct Fixture {
        service: SessionService,
        users: MemoryUserRepository,
        sessions: MemoryRefreshTokenStore,
        user: User,
    }

    async fn fixture() -> Fixture {
        let users = MemoryUserRepository::new();
        let sessions = MemoryRefreshTokenStore::new();
        let hasher = test_hasher();

        let user = users
            .create(User::new("alice", "Alice", hasher.hash("pw123").unwrap()))
            .await
            .unwrap();

        let service = SessionService::new(
            Arc::new(users.clone()),
            Arc::new(sessions.clone()),
            hasher,
            Arc::new(test_issuer()),
        );

        Fixture {
            service,
            users,
            sessions,
            user,
        }
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let digest = hash_token("abc");
        assert_eq!(digest, hash_token("abc"));
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, hash_token("abd"));
    }

    #[tokio::test]
    async fn test_login_issues_pair_and_stores_digest() {
        let f = fixture().await;
        let pair = f.service.login("alice", "pw123").await.unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);
        assert_eq!(f.service.authenticate(&pair.access_token).unwrap(), f.user.id);
        assert_eq!(
            f.sessions.get_refresh_token(f.user.id).await.unwrap(),
            Some(hash_token(&pair.refresh_token))
        );
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let f = fixture().await;

        assert!(matches!(
            f.service.login("alice", "wrong").await,
            Err(ServiceError::AuthenticationFailed)
        ));
        assert!(matches!(
            f.service.login("mallory", "pw123").await,
            Err(ServiceError::AuthenticationFailed)
        ));
        assert!(!f.sessions.contains(f.user.id).await);
    }

    #[tokio::test]
    async fn test_unknown_username_still_runs_verification() {
        let f = fixture().await;
        assert!(f.service.dummy_hash.get().is_none());

        let result = f.service.login("mallory", "pw123").await;

        assert!(matches!(result, Err(ServiceError::AuthenticationFailed)));
        let dummy = f.service.dummy_hash.get().expect("dummy hash prepared");
        assert!(dummy.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let f = fixture().await;
        let pair = f.service.login("alice", "pw123").await.unwrap();

        let (a, b) = tokio::join!(
            f.service.refresh(&pair.refresh_token),
            f.service.refresh(&pair.refresh_token)
        );

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!([a, b]
            .into_iter()
            .filter_map(Result::err)
            .all(|e| matches!(e, ServiceError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let f = fixture().await;
        let first = f.service.login("alice", "pw123").await.unwrap();

        let second = f.service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        // The old refresh token has been replaced
        assert!(matches!(
            f.service.refresh(&first.refresh_token).await,
            Err(ServiceError::TokenInvalid)
        ));
        f.service.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let f = fixture().await;
        let pair = f.service.login("alice", "pw123").await.unwrap();

        assert!(matches!(
            f.service.refresh(&pair.access_token).await,
            Err(ServiceError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_refresh_expired_token() {
        let f = fixture().await;
        let stale = f
            .service
            .issuer()
            .issue_at(
                TokenKind::Refresh,
                f.user.id,
                SystemTime::now() - Duration::from_secs(7200),
            )
            .unwrap();

        assert!(matches!(
            f.service.refresh(&stale).await,
            Err(ServiceError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh() {
        let f = fixture().await;
        let pair = f.service.login("alice", "pw123").await.unwrap();

        f.service.logout(f.user.id).await.unwrap();
        f.service.logout(f.user.id).await.unwrap();

        assert!(matches!(
            f.service.refresh(&pair.refresh_token).await,
            Err(ServiceError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_user_revokes() {
        let f = fixture().await;
        let pair = f.service.login("alice", "pw123").await.unwrap();

        // Simulate a leaked session entry: user gone, token still stored
        f.users.delete(f.user.id).await.unwrap();

        assert!(matches!(
            f.service.refresh(&pair.refresh_token).await,
            Err(ServiceError::TokenInvalid)
        ));
        assert!(!f.sessions.contains(f.user.id).await);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_token() {
        let f = fixture().await;
        let pair = f.service.login("alice", "pw123").await.unwrap();

        assert!(matches!(
            f.service.authenticate(&pair.refresh_token),
            Err(ServiceError::TokenInvalid)
        ));
    }
}
