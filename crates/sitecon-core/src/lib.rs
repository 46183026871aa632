//! Sitecon Core - Identity models, storage contracts and shared configuration
//!
//! This crate defines the pieces the identity services are built on:
//! - The `User` identity record
//! - Repository traits for durable users and ephemeral refresh tokens
//! - PostgreSQL and Redis implementations of those traits
//! - Configuration management and tracing initialisation

pub mod config;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod models;
pub mod postgres;
pub mod redis_store;
pub mod repository;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, DatabaseConfig, LoggingConfig, PasswordConfig, TokenConfig};
pub use models::User;
pub use postgres::PgUserRepository;
pub use redis_store::RedisRefreshTokenStore;
pub use repository::{RefreshTokenStore, RepositoryError, UserRepository};
pub use telemetry::TelemetryError;

/// Result alias for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;
