//! Domain models for accounts and sessions
//!
//! - User: account record including the access-token invalidation cutoff
//! - RefreshToken: stored digest of a long-lived, single-use refresh secret
//! - UserPublic: projection safe to hand to clients

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::LibrisError;

/// Current time at the resolution every store keeps (microseconds)
///
/// PostgreSQL `TIMESTAMPTZ` keeps microseconds, so cutoffs and issue
/// times are truncated the same way before they are compared.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// User role
///
/// - Owner: full content-management rights
/// - Member: consumption, save, like and comment rights
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Owner => "owner",
            UserRole::Member => "member",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = LibrisError;

    /// Exact match only; anything else is a corrupt record, never a default role
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(UserRole::Owner),
            "member" => Ok(UserRole::Member),
            other => Err(LibrisError::CorruptRecord(format!("unknown role '{other}'"))),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User account model
///
/// This maps to the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: String,

    /// Email address (unique, compared exactly as stored)
    pub email: String,

    /// Argon2id PHC string; never serialized in API responses
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Access tokens issued before this instant are rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_invalidated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether an access token issued at `issued_at` predates the invalidation cutoff
    pub fn is_token_revoked(&self, issued_at: DateTime<Utc>) -> bool {
        match self.token_invalidated_at {
            Some(cutoff) => issued_at < cutoff,
            None => false,
        }
    }

    /// Convert user to public representation (without sensitive fields)
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

/// Fields supplied when creating a user; the store assigns id and timestamps
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UserPublic {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// Refresh token model
///
/// Only the SHA-256 digest of the secret is stored.
/// This maps to the `refresh_tokens` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Hex SHA-256 digest of the opaque token (unique)
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Expired once the current time is strictly past `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
