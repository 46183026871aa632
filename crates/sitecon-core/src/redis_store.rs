//! Redis refresh-token store
//!
//! One key per user (`refresh_token:<user id>`) holding the SHA-256 digest of the
//! current refresh token. Keys expire with the token, so Redis drops stale
//! sessions without a sweeper. Rotation swaps the digest with a Lua script so
//! two refreshes racing on the same token cannot both win.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{RefreshTokenStore, RepositoryError, RepositoryResult};

const KEY_PREFIX: &str = "refresh_token";

/// KEYS[1] = token key, ARGV = expected digest, new digest, ttl seconds
const REPLACE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

/// Build the Redis key for a user's refresh token
pub fn refresh_token_key(user_id: Uuid) -> String {
    format!("{KEY_PREFIX}:{user_id}")
}

#[derive(Clone)]
pub struct RedisRefreshTokenStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisRefreshTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisRefreshTokenStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisRefreshTokenStore {
    pub async fn connect(redis_url: &str) -> RepositoryResult<Self> {
        info!("Connecting to Redis session store");

        let client = redis::Client::open(redis_url).map_err(|e| {
            RepositoryError::SessionStore(format!("Failed to create Redis client: {e}"))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            RepositoryError::SessionStore(format!("Failed to connect to Redis: {e}"))
        })?;

        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RefreshTokenStore for RedisRefreshTokenStore {
    async fn save_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        ttl: Duration,
    ) -> RepositoryResult<()> {
        let key = refresh_token_key(user_id);
        debug!(%key, ttl_secs = ttl.as_secs(), "Redis SETEX");

        // SETEX rejects a zero expiry
        let secs = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, token_hash, secs)
            .await
            .map_err(|e| RepositoryError::SessionStore(format!("Redis SETEX failed: {e}")))?;

        Ok(())
    }

    async fn get_refresh_token(&self, user_id: Uuid) -> RepositoryResult<Option<String>> {
        let key = refresh_token_key(user_id);
        let mut conn = self.conn.clone();

        let stored: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| RepositoryError::SessionStore(format!("Redis GET failed: {e}")))?;

        Ok(stored)
    }

    async fn replace_refresh_token(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        ttl: Duration,
    ) -> RepositoryResult<bool> {
        let key = refresh_token_key(user_id);
        let mut conn = self.conn.clone();

        let swapped: i64 = redis::Script::new(REPLACE_SCRIPT)
            .key(&key)
            .arg(expected_hash)
            .arg(new_hash)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RepositoryError::SessionStore(format!("Redis token swap failed: {e}")))?;

        debug!(%key, swapped, "Redis compare-and-set");
        Ok(swapped == 1)
    }

    async fn delete_refresh_token_by_user_id(&self, user_id: Uuid) -> RepositoryResult<()> {
        let key = refresh_token_key(user_id);
        let mut conn = self.conn.clone();

        let removed: usize = conn
            .del(&key)
            .await
            .map_err(|e| RepositoryError::SessionStore(format!("Redis DEL failed: {e}")))?;

        debug!(%key, removed, "Redis DEL");
        Ok(())
    }
}
