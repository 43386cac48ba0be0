//! Authentication service layer
//!
//! Registration, login, refresh-token rotation and logout. State lives
//! entirely in the two persistence collaborators; the service itself only
//! holds configuration and a lazily built decoy hash, and is cheap to clone.

use super::jwt::{
    generate_refresh_token, hash_refresh_token, issue_access_token_at, JwtConfig,
};
use super::password::{
    hash_password_blocking, validate_password_strength, verify_password_blocking, PasswordConfig,
};
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use libris_core::{
    now_micros, AuthConfig, LibrisError, NewUser, RefreshTokenStore, User, UserDirectory,
    UserPublic, UserRole,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use utoipa::ToSchema;
use validator::ValidateEmail;

const INVALID_CREDENTIALS: &str = "invalid email or password";
const INVALID_REFRESH_TOKEN: &str = "invalid refresh token";

/// Hashed once per service and verified against when a login email is unknown
const DECOY_PASSWORD: &str = "Decoy-Passw0rd!";

/// User registration request
///
/// Unknown fields (including `role`) are ignored; new accounts are always members.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Authentication response with tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub user: UserPublic,
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if email.is_empty() {
        return Err(AppError::Validation("email is required".to_string()));
    }
    if !email.validate_email() || !has_dotted_domain(email) {
        return Err(AppError::Validation("invalid email format".to_string()));
    }
    Ok(())
}

/// Domain has at least two labels and ends in an alphabetic TLD of two or more letters
fn has_dotted_domain(email: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    match domain.rsplit_once('.') {
        Some((rest, tld)) => {
            !rest.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn validate_required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn duplicate_email(err: LibrisError) -> AppError {
    match err {
        LibrisError::Duplicate(_) => AppError::AlreadyExists("email already exists".to_string()),
        other => other.into(),
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    jwt_config: JwtConfig,
    refresh_token_ttl: Duration,
    password_config: PasswordConfig,
    users: Arc<dyn UserDirectory>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    decoy_hash: Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserDirectory>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            jwt_config: JwtConfig::from(config),
            refresh_token_ttl: Duration::days(i64::from(config.refresh_token_ttl_days)),
            password_config: PasswordConfig::default(),
            users,
            refresh_tokens,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Override the Argon2 parameters used for new hashes
    pub fn with_password_config(mut self, password_config: PasswordConfig) -> Self {
        self.password_config = password_config;
        self
    }

    pub fn jwt_config(&self) -> &JwtConfig {
        &self.jwt_config
    }

    pub fn users(&self) -> Arc<dyn UserDirectory> {
        self.users.clone()
    }

    /// Register a new member account and issue its first token pair
    ///
    /// Checks run in order: email, password strength, names, uniqueness.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AppError> {
        validate_email(&request.email)?;
        validate_password_strength(&request.password).map_err(AppError::Validation)?;
        validate_required("first_name", &request.first_name)?;
        validate_required("last_name", &request.last_name)?;

        if self.users.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::AlreadyExists("email already exists".to_string()));
        }

        let password_hash =
            hash_password_blocking(request.password, self.password_config.clone()).await?;

        // A concurrent registration can still win between the check and the insert
        let user = self
            .users
            .create(NewUser {
                email: request.email,
                password_hash,
                first_name: request.first_name,
                last_name: request.last_name,
                role: UserRole::Member,
            })
            .await
            .map_err(duplicate_email)?;

        tracing::debug!(user_id = %user.id, "user registered");
        self.issue_token_pair(&user, now_micros()).await
    }

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        let Some(user) = self.users.find_by_email(&request.email).await? else {
            self.verify_against_decoy(request.password).await;
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        let password_valid =
            verify_password_blocking(request.password, user.password_hash.clone()).await?;
        if !password_valid {
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        self.issue_token_pair(&user, now_micros()).await
    }

    /// Exchange a refresh token for a new pair
    ///
    /// The presented token is consumed, and every access token issued to
    /// the user before this call is invalidated. Of several concurrent
    /// calls with the same token, at most one succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AppError> {
        let token_hash = hash_refresh_token(refresh_token);

        let stored = self
            .refresh_tokens
            .find_by_token(&token_hash)
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_REFRESH_TOKEN.to_string()))?;

        let now = now_micros();
        if stored.is_expired_at(now) {
            self.refresh_tokens.delete_by_token(&token_hash).await?;
            return Err(AppError::Unauthorized("refresh token expired".to_string()));
        }

        if !self.refresh_tokens.delete_by_token(&token_hash).await? {
            tracing::debug!(user_id = %stored.user_id, "refresh token consumed concurrently");
            return Err(AppError::Unauthorized(INVALID_REFRESH_TOKEN.to_string()));
        }

        self.users.invalidate_tokens(&stored.user_id, now).await?;

        let user = self
            .users
            .find_by_id(&stored.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user not found".to_string()))?;

        // Issued exactly at the cutoff, so the new access token survives it
        self.issue_token_pair(&user, now).await
    }

    /// Revoke every session of a user
    ///
    /// Returns how many refresh tokens were deleted. Safe to repeat.
    pub async fn logout(&self, user_id: &str) -> Result<u64, AppError> {
        self.users.invalidate_tokens(user_id, now_micros()).await?;
        let removed = self.refresh_tokens.delete_all_for_user(user_id).await?;
        Ok(removed)
    }

    /// Public profile of a user
    pub async fn get_user(&self, user_id: &str) -> Result<UserPublic, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

        Ok(user.to_public())
    }

    /// Create the owner account if no user holds `email` yet
    ///
    /// Returns `true` when an account was created. An existing account is
    /// left untouched, whatever its role.
    pub async fn ensure_owner(&self, email: &str, password: &str) -> Result<bool, AppError> {
        validate_email(email)?;
        validate_password_strength(password).map_err(AppError::Validation)?;

        if self.users.find_by_email(email).await?.is_some() {
            return Ok(false);
        }

        let password_hash =
            hash_password_blocking(password.to_string(), self.password_config.clone()).await?;

        let created = self
            .users
            .create(NewUser {
                email: email.to_string(),
                password_hash,
                first_name: "Super".to_string(),
                last_name: "Admin".to_string(),
                role: UserRole::Owner,
            })
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = %user.id, email = %user.email, "owner account created");
                Ok(true)
            }
            Err(LibrisError::Duplicate(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete refresh tokens that are past their expiry
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        Ok(self.refresh_tokens.delete_expired(now_micros()).await?)
    }

    /// Spend one Argon2 verification so an unknown email costs what a known one does
    async fn verify_against_decoy(&self, password: String) {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| {
                hash_password_blocking(DECOY_PASSWORD.to_string(), self.password_config.clone())
            })
            .await;

        match decoy {
            Ok(hash) => {
                if let Err(e) = verify_password_blocking(password, hash.clone()).await {
                    tracing::warn!(error = %e, "decoy password verification failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to prepare decoy password hash"),
        }
    }

    async fn issue_token_pair(
        &self,
        user: &User,
        issued_at: DateTime<Utc>,
    ) -> Result<AuthResponse, AppError> {
        let access_token =
            issue_access_token_at(&self.jwt_config, &user.id, &user.email, user.role, issued_at)?;

        let refresh_token = generate_refresh_token();
        let expires_at = issued_at + self.refresh_token_ttl;
        self.refresh_tokens
            .create(&user.id, &hash_refresh_token(&refresh_token), expires_at)
            .await
            .map_err(|e| AppError::internal("failed to store refresh token", e))?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_config.access_expiration_secs,
            user: user.to_public(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::validate_access_token;
    use libris_core::MemoryStore;

    fn service_with_store() -> (AuthService, MemoryStore) {
        let store = MemoryStore::new();
        let service = AuthService::new(
            &AuthConfig::default(),
            store.users.clone(),
            store.refresh_tokens.clone(),
        )
        .with_password_config(PasswordConfig::light());
        (service, store)
    }

    fn service() -> AuthService {
        service_with_store().0
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            email: "alice@example.com".to_string(),
            password: "Abcd1234!".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    async fn pause() {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_register_yields_member() {
        let service = service();
        let response = service.register(alice()).await.unwrap();

        assert_eq!(response.user.role, UserRole::Member);
        assert_eq!(response.user.email, "alice@example.com");
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 24 * 3600);

        let claims = validate_access_token(service.jwt_config(), &response.access_token).unwrap();
        assert_eq!(claims.sub, response.user.id);
        assert_eq!(claims.role, "member");
    }

    #[tokio::test]
    async fn test_register_ignores_client_role() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "mallory@example.com",
            "password": "Abcd1234!",
            "first_name": "Mallory",
            "last_name": "Owner",
            "role": "owner",
        }))
        .unwrap();

        let response = service().register(request).await.unwrap();
        assert_eq!(response.user.role, UserRole::Member);
    }

    #[tokio::test]
    async fn test_register_reports_first_failed_password_rule() {
        let service = service();
        let cases = [
            ("Ab1!", "password must be at least 8 characters long"),
            ("abcd1234!", "password must contain at least one uppercase letter"),
            ("ABCD1234!", "password must contain at least one lowercase letter"),
            ("Abcdefgh!", "password must contain at least one number"),
            ("Abcd12345", "password must contain at least one special character"),
        ];

        for (password, expected) in cases {
            let err = service
                .register(RegisterRequest {
                    password: password.to_string(),
                    ..alice()
                })
                .await
                .unwrap_err();
            match err {
                AppError::Validation(msg) => assert_eq!(msg, expected),
                other => panic!("expected validation error for {password}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_register_rejects_bad_email_and_names() {
        let service = service();

        for email in [
            "",
            "not-an-email",
            "a b@example.com",
            "alice@localhost",
            "alice@example",
            "a@b.c",
            "alice@example.c0m",
        ] {
            let result = service
                .register(RegisterRequest {
                    email: email.to_string(),
                    ..alice()
                })
                .await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{email}");
        }

        let result = service
            .register(RegisterRequest {
                first_name: "  ".to_string(),
                ..alice()
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(msg)) if msg == "first_name is required"));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (service, store) = service_with_store();
        tokio_test::assert_ok!(service.register(alice()).await);

        let err = tokio_test::assert_err!(service.register(alice()).await);
        assert!(matches!(err, AppError::AlreadyExists(_)));
        assert_eq!(store.users.len().await, 1);
    }

    #[tokio::test]
    async fn test_login_unknown_email_still_verifies() {
        let service = service();
        assert!(service.decoy_hash.get().is_none());

        let result = service.login(login("nobody@example.com", "Abcd1234!")).await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, AppError::Unauthorized(msg) if msg == "invalid email or password"));

        let decoy = service.decoy_hash.get().expect("decoy hash prepared");
        assert!(decoy.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_login_scenario() {
        let service = service();
        let registered = service.register(alice()).await.unwrap();

        // Wrong password and unknown email are indistinguishable
        for request in [
            login("alice@example.com", "Wrong1234!"),
            login("nobody@example.com", "Abcd1234!"),
        ] {
            match service.login(request).await.unwrap_err() {
                AppError::Unauthorized(msg) => assert_eq!(msg, "invalid email or password"),
                other => panic!("expected unauthorized, got {other:?}"),
            }
        }

        let logged_in = service
            .login(login("alice@example.com", "Abcd1234!"))
            .await
            .unwrap();
        assert_ne!(logged_in.refresh_token, registered.refresh_token);
        assert_eq!(logged_in.user.id, registered.user.id);

        // Login does not rotate the registration token: it works once, then never again
        service.refresh(&registered.refresh_token).await.unwrap();
        assert!(matches!(
            service.refresh(&registered.refresh_token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_is_single_use() {
        let service = service();
        let first = service.register(alice()).await.unwrap();

        let second = service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        match service.refresh(&first.refresh_token).await.unwrap_err() {
            AppError::Unauthorized(msg) => assert_eq!(msg, "invalid refresh token"),
            other => panic!("expected unauthorized, got {other:?}"),
        }

        // The rotated token is still good
        service.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_unknown_token() {
        assert!(matches!(
            service().refresh("never-issued").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_invalidates_prior_access_tokens() {
        let (service, store) = service_with_store();
        let first = service.register(alice()).await.unwrap();
        pause().await;

        let second = service.refresh(&first.refresh_token).await.unwrap();

        let user = store.users.find_by_id(&first.user.id).await.unwrap().unwrap();
        let old = validate_access_token(service.jwt_config(), &first.access_token).unwrap();
        let new = validate_access_token(service.jwt_config(), &second.access_token).unwrap();

        assert!(user.is_token_revoked(old.issued_at().unwrap()));
        assert!(!user.is_token_revoked(new.issued_at().unwrap()));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_deleted() {
        let (service, store) = service_with_store();
        let registered = service.register(alice()).await.unwrap();

        let stale = "stale-refresh-token";
        store
            .refresh_tokens
            .create(
                &registered.user.id,
                &hash_refresh_token(stale),
                now_micros() - Duration::seconds(1),
            )
            .await
            .unwrap();

        match service.refresh(stale).await.unwrap_err() {
            AppError::Unauthorized(msg) => assert_eq!(msg, "refresh token expired"),
            other => panic!("expected unauthorized, got {other:?}"),
        }
        assert!(store
            .refresh_tokens
            .find_by_token(&hash_refresh_token(stale))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_refresh_for_vanished_user() {
        let (service, store) = service_with_store();
        let orphan = "orphan-token";
        store
            .refresh_tokens
            .create("ghost", &hash_refresh_token(orphan), now_micros() + Duration::days(1))
            .await
            .unwrap();

        assert!(matches!(
            service.refresh(orphan).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let service = service();
        let registered = service.register(alice()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let token = registered.refresh_token.clone();
                tokio::spawn(async move { service.refresh(&token).await })
            })
            .collect();

        let mut winners = 0;
        for result in futures::future::join_all(handles).await {
            match result.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::Unauthorized(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_logout_revokes_everything() {
        let (service, store) = service_with_store();
        let registered = service.register(alice()).await.unwrap();
        let logged_in = service
            .login(login("alice@example.com", "Abcd1234!"))
            .await
            .unwrap();
        pause().await;

        assert_eq!(service.logout(&registered.user.id).await.unwrap(), 2);

        for token in [&registered.refresh_token, &logged_in.refresh_token] {
            assert!(matches!(
                service.refresh(token).await,
                Err(AppError::Unauthorized(_))
            ));
        }

        let user = store.users.find_by_id(&registered.user.id).await.unwrap().unwrap();
        let claims = validate_access_token(service.jwt_config(), &logged_in.access_token).unwrap();
        assert!(user.is_token_revoked(claims.issued_at().unwrap()));

        // Idempotent
        assert_eq!(service.logout(&registered.user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_user() {
        let service = service();
        let registered = service.register(alice()).await.unwrap();

        let user = service.get_user(&registered.user.id).await.unwrap();
        assert_eq!(user, registered.user);
        assert!(matches!(
            service.get_user("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_owner() {
        let service = service();

        assert!(service
            .ensure_owner("owner@example.com", "Owner123!")
            .await
            .unwrap());
        assert!(!service
            .ensure_owner("owner@example.com", "Owner123!")
            .await
            .unwrap());

        let response = service
            .login(login("owner@example.com", "Owner123!"))
            .await
            .unwrap();
        assert_eq!(response.user.role, UserRole::Owner);
        assert_eq!(response.user.first_name, "Super");

        assert!(matches!(
            service.ensure_owner("owner2@example.com", "weak").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (service, store) = service_with_store();
        let registered = service.register(alice()).await.unwrap();
        store
            .refresh_tokens
            .create(
                &registered.user.id,
                "expired-digest",
                now_micros() - Duration::days(1),
            )
            .await
            .unwrap();

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert_eq!(service.purge_expired().await.unwrap(), 0);
        // The live token survives the sweep
        service.refresh(&registered.refresh_token).await.unwrap();
    }
}
