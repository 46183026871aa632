//! In-memory stores for tests
//!
//! Both stores honour the same contracts as the PostgreSQL and Redis backends:
//! username uniqueness is checked under the write lock, and deleting a missing
//! refresh token succeeds.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{RefreshTokenStore, RepositoryError, RepositoryResult, User, UserRepository};

/// User repository backed by a `HashMap`
#[derive(Debug, Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn get_by_username(&self, username: &str) -> RepositoryResult<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_all(&self) -> RepositoryResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn create(&self, user: User) -> RepositoryResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::UniqueViolation("users_username".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> RepositoryResult<User> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(RepositoryError::NotFound);
        }
        if users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(RepositoryError::UniqueViolation("users_username".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

/// Refresh-token store with per-entry expiry
#[derive(Debug, Clone, Default)]
pub struct MemoryRefreshTokenStore {
    tokens: Arc<RwLock<HashMap<Uuid, StoredToken>>>,
}

#[derive(Debug)]
struct StoredToken {
    hash: String,
    /// `None` when the lifetime does not fit in an `Instant`
    expires_at: Option<Instant>,
}

impl StoredToken {
    fn new(hash: &str, ttl: Duration) -> Self {
        Self {
            hash: hash.to_string(),
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn live_hash(&self) -> Option<&str> {
        match self.expires_at {
            Some(expires_at) if expires_at <= Instant::now() => None,
            _ => Some(&self.hash),
        }
    }
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, user_id: Uuid) -> bool {
        matches!(self.get_refresh_token(user_id).await, Ok(Some(_)))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn save_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        ttl: Duration,
    ) -> RepositoryResult<()> {
        self.tokens
            .write()
            .await
            .insert(user_id, StoredToken::new(token_hash, ttl));
        Ok(())
    }

    async fn get_refresh_token(&self, user_id: Uuid) -> RepositoryResult<Option<String>> {
        Ok(self
            .tokens
            .read()
            .await
            .get(&user_id)
            .and_then(StoredToken::live_hash)
            .map(str::to_string))
    }

    async fn replace_refresh_token(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        ttl: Duration,
    ) -> RepositoryResult<bool> {
        let mut tokens = self.tokens.write().await;
        let matches = tokens
            .get(&user_id)
            .and_then(StoredToken::live_hash)
            .is_some_and(|hash| hash == expected_hash);

        if matches {
            tokens.insert(user_id, StoredToken::new(new_hash, ttl));
        }
        Ok(matches)
    }

    async fn delete_refresh_token_by_user_id(&self, user_id: Uuid) -> RepositoryResult<()> {
        self.tokens.write().await.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = MemoryUserRepository::new();
        let user = repo.create(User::new("alice", "Alice", "h")).await.unwrap();

        assert_eq!(repo.get_by_id(user.id).await.unwrap(), user);
        assert_eq!(repo.get_by_username("alice").await.unwrap(), user);
        assert!(repo.get_by_username("bob").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let repo = MemoryUserRepository::new();
        repo.create(User::new("alice", "Alice", "h")).await.unwrap();

        let result = repo.create(User::new("alice", "Other", "h2")).await;
        assert!(matches!(result, Err(RepositoryError::UniqueViolation(_))));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_into_taken_username_rejected() {
        let repo = MemoryUserRepository::new();
        repo.create(User::new("alice", "Alice", "h")).await.unwrap();
        let mut bob = repo.create(User::new("bob", "Bob", "h")).await.unwrap();

        bob.username = "alice".to_string();
        let result = repo.update(bob).await;
        assert!(matches!(result, Err(RepositoryError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let repo = MemoryUserRepository::new();
        let user = repo.create(User::new("alice", "Alice", "h")).await.unwrap();

        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_refresh_token_expiry_and_idempotent_delete() {
        let store = MemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();

        store
            .save_refresh_token(user_id, "digest", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get_refresh_token(user_id).await.unwrap().as_deref(),
            Some("digest")
        );

        store.delete_refresh_token_by_user_id(user_id).await.unwrap();
        store.delete_refresh_token_by_user_id(user_id).await.unwrap();
        assert!(!store.contains(user_id).await);

        store
            .save_refresh_token(user_id, "digest", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.get_refresh_token(user_id).await.unwrap(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let repo = MemoryUserRepository::new();
        let other = repo.clone();

        tokio_test::block_on(async {
            repo.create(User::new("alice", "Alice", "h")).await.unwrap();
            assert_eq!(other.len().await, 1);
            assert!(other.get_by_username("alice").await.is_ok());
        });
    }

    #[tokio::test]
    async fn test_oversized_ttl_never_expires() {
        let store = MemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();

        store
            .save_refresh_token(user_id, "digest", Duration::MAX)
            .await
            .unwrap();
        assert!(store.contains(user_id).await);
    }

    #[tokio::test]
    async fn test_replace_only_when_digest_matches() {
        let store = MemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let ttl = Duration::from_secs(60);

        assert!(!store.replace_refresh_token(user_id, "a", "b", ttl).await.unwrap());
        assert!(!store.contains(user_id).await);

        store.save_refresh_token(user_id, "a", ttl).await.unwrap();
        assert!(store.replace_refresh_token(user_id, "a", "b", ttl).await.unwrap());
        assert!(!store.replace_refresh_token(user_id, "a", "c", ttl).await.unwrap());
        assert_eq!(
            store.get_refresh_token(user_id).await.unwrap().as_deref(),
            Some("b")
        );
    }
}
