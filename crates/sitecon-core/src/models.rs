//! Identity record model
//!
//! A `User` is the authoritative representation of an account. It maps to the
//! `users` table in PostgreSQL (see `schema.sql`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier, assigned at creation and never changed
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Login handle, unique among live users
    pub username: String,

    /// Argon2id PHC string.
    /// This field is never serialized in responses
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Account creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, not yet persisted user with a fresh identifier
    ///
    /// # Arguments
    ///
    /// * `username` - Unique login handle
    /// * `name` - Display name
    /// * `password_hash` - Already hashed password
    pub fn new(
        username: impl Into<String>,
        name: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            username: username.into(),
            password_hash: password_hash.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the record as modified now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
