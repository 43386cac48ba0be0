//! Persistence collaborators consumed by the auth core
//!
//! Every operation is a single-row (or single-statement) call; callers get
//! per-call consistency and nothing more. Uniqueness of user emails and of
//! refresh token digests is enforced here, not by the caller.

mod memory;
mod postgres;

pub use memory::{MemoryRefreshTokenStore, MemoryStore, MemoryUserDirectory};
pub use postgres::{PgRefreshTokenStore, PgStore, PgUserDirectory};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{NewUser, RefreshToken, User};
use crate::Result;

/// Lookup and mutation of user accounts
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by exact email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find a user by id
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Create a user; fails with `LibrisError::Duplicate` when the email is taken
    async fn create(&self, user: NewUser) -> Result<User>;

    /// Record `cutoff` as the instant before which issued access tokens are rejected
    ///
    /// A cutoff earlier than the one already recorded is ignored. Unknown
    /// user ids are a no-op.
    async fn invalidate_tokens(&self, user_id: &str, cutoff: DateTime<Utc>) -> Result<()>;

    /// Cheap liveness check of the backing store
    async fn ping(&self) -> Result<()>;
}

/// Storage of refresh token digests
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a digest for `user_id`
    async fn create(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken>;

    /// Find a stored token by digest
    async fn find_by_token(&self, token_hash: &str) -> Result<Option<RefreshToken>>;

    /// Delete a token by digest
    ///
    /// Returns `true` only for the call that actually removed the row, so
    /// concurrent consumers of the same token see exactly one winner.
    async fn delete_by_token(&self, token_hash: &str) -> Result<bool>;

    /// Delete every token owned by `user_id`, returning how many were removed
    async fn delete_all_for_user(&self, user_id: &str) -> Result<u64>;

    /// Delete tokens whose expiry is before `now`, returning how many were removed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
