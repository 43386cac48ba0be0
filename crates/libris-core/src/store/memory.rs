//! In-memory stores for tests and single-process deployments
//!
//! Each map sits behind a tokio `RwLock`; every trait call takes the lock
//! once, which gives the same per-call atomicity the SQL backend has.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RefreshTokenStore, UserDirectory};
use crate::models::{now_micros, NewUser, RefreshToken, User};
use crate::{LibrisError, Result};

/// In-memory user directory keyed by user id
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(LibrisError::Duplicate(format!("email {}", user.email)));
        }

        let now = now_micros();
        let created = User {
            id: Uuid::new_v4().to_string(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            created_at: now,
            updated_at: now,
            token_invalidated_at: None,
        };
        users.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn invalidate_tokens(&self, user_id: &str, cutoff: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            // The cutoff only moves forward
            if user.token_invalidated_at.map_or(true, |current| cutoff > current) {
                user.token_invalidated_at = Some(cutoff);
                user.updated_at = cutoff;
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory refresh token store keyed by token digest
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn create(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(token_hash) {
            return Err(LibrisError::Duplicate("refresh token".to_string()));
        }

        let token = RefreshToken {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: token_hash.to_string(),
            expires_at,
            created_at: now_micros(),
        };
        tokens.insert(token_hash.to_string(), token.clone());
        Ok(token)
    }

    async fn find_by_token(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        Ok(self.tokens.read().await.get(token_hash).cloned())
    }

    async fn delete_by_token(&self, token_hash: &str) -> Result<bool> {
        Ok(self.tokens.write().await.remove(token_hash).is_some())
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - tokens.len()) as u64)
    }
}

/// Both in-memory stores, ready to be shared
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub users: Arc<MemoryUserDirectory>,
    pub refresh_tokens: Arc<MemoryRefreshTokenStore>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}
