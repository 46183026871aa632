//! Sitecon Auth - Identity lifecycle and session tokens
//!
//! This crate provides the services built on top of `sitecon-core`:
//! - Password hashing with Argon2id
//! - Access/refresh JWT issuing and verification
//! - The identity service (create, look up, update, delete users)
//! - The session service (login, refresh, logout)

pub mod error;
pub mod jwt;
pub mod models;
pub mod password;
pub mod service;
pub mod session;
pub mod state;

pub use error::ServiceError;
pub use jwt::{Claims, TokenError, TokenIssuer, TokenKind, TokenSettings};
pub use models::{CreateUserInput, TokenPair, UpdateUserInput};
pub use password::{Argon2Hasher, PasswordError};
pub use service::UserService;
pub use session::{hash_token, SessionService};
pub use state::AuthState;
