//! libris core - domain models, configuration and persistence traits
//!
//! This crate defines the abstractions the auth core plugs into:
//! - Account and session models (users, refresh tokens, roles)
//! - Common error types
//! - Persistence collaborator traits with PostgreSQL and in-memory backends
//! - Configuration management

pub mod config;
pub mod models;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseBackend, DatabaseConfig, LoggingConfig,
    RevocationMode, SeedOwnerConfig, ServerConfig,
};
pub use models::{now_micros, NewUser, RefreshToken, User, UserPublic, UserRole};
pub use store::{
    MemoryRefreshTokenStore, MemoryStore, MemoryUserDirectory, PgRefreshTokenStore, PgStore,
    PgUserDirectory, RefreshTokenStore, UserDirectory,
};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for persistence and configuration
#[derive(Error, Debug)]
pub enum LibrisError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LibrisError>;
