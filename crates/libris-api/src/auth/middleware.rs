//! Request gates for protected routes
//!
//! `require_authenticated` validates the bearer token and puts an
//! [`AuthenticatedUser`] into request extensions; `require_role` checks that
//! identity against an allow-list. Either gate drains the request body
//! before rejecting.

use super::jwt::{validate_access_token, Claims, JwtConfig};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use libris_core::{AuthConfig, RevocationMode, UserDirectory, UserRole};
use serde::Serialize;
use std::sync::Arc;

/// Identity of the caller, available to handlers via `Extension<AuthenticatedUser>`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
    /// When the presented access token was issued
    pub issued_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub fn is_owner(&self) -> bool {
        self.role == UserRole::Owner
    }

    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        roles.contains(&self.role)
    }
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = AppError;

    /// A validly signed token naming an unknown role is a server fault, not a client one
    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let issued_at = claims
            .issued_at()
            .ok_or_else(|| AppError::Unauthorized("invalid or expired token".to_string()))?;
        let role = claims
            .role
            .parse::<UserRole>()
            .map_err(|e| AppError::internal("access token carries an unknown role", e))?;

        Ok(Self {
            user_id: claims.sub,
            email: claims.email,
            role,
            issued_at,
        })
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
///
/// The header must split on single spaces into exactly two parts, the
/// first being literally `Bearer`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("authorization header required".to_string()))?;

    let invalid_format = || AppError::Unauthorized("invalid authorization header format".to_string());
    let value = value.to_str().map_err(|_| invalid_format())?;

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Ok(*token),
        _ => Err(invalid_format()),
    }
}

/// Signature and expiry checks only
#[derive(Debug, Clone)]
pub struct StatelessAuthMiddleware {
    jwt_config: JwtConfig,
}

impl StatelessAuthMiddleware {
    pub fn new(jwt_config: JwtConfig) -> Self {
        Self { jwt_config }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AppError> {
        let token = bearer_token(headers)?;
        let claims = validate_access_token(&self.jwt_config, token)?;
        AuthenticatedUser::try_from(claims)
    }
}

/// Stateless checks plus a directory lookup against the user's revocation cutoff
#[derive(Clone)]
pub struct RevocationAwareAuthMiddleware {
    stateless: StatelessAuthMiddleware,
    users: Arc<dyn UserDirectory>,
}

impl RevocationAwareAuthMiddleware {
    pub fn new(jwt_config: JwtConfig, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            stateless: StatelessAuthMiddleware::new(jwt_config),
            users,
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AppError> {
        let identity = self.stateless.authenticate(headers)?;

        let user = self
            .users
            .find_by_id(&identity.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user not found".to_string()))?;

        if user.is_token_revoked(identity.issued_at) {
            return Err(AppError::Unauthorized(
                "token has been invalidated".to_string(),
            ));
        }

        Ok(identity)
    }
}

/// The authentication gate chosen at wiring time
#[derive(Clone)]
pub enum AuthGate {
    Stateless(StatelessAuthMiddleware),
    RevocationAware(RevocationAwareAuthMiddleware),
}

impl AuthGate {
    pub fn from_config(config: &AuthConfig, users: Arc<dyn UserDirectory>) -> Self {
        let jwt_config = JwtConfig::from(config);
        match config.revocation_mode {
            RevocationMode::Stateless => {
                AuthGate::Stateless(StatelessAuthMiddleware::new(jwt_config))
            }
            RevocationMode::RevocationAware => {
                AuthGate::RevocationAware(RevocationAwareAuthMiddleware::new(jwt_config, users))
            }
        }
    }

    pub fn mode(&self) -> RevocationMode {
        match self {
            AuthGate::Stateless(_) => RevocationMode::Stateless,
            AuthGate::RevocationAware(_) => RevocationMode::RevocationAware,
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AppError> {
        match self {
            AuthGate::Stateless(gate) => gate.authenticate(headers),
            AuthGate::RevocationAware(gate) => gate.authenticate(headers).await,
        }
    }
}

/// Read and discard whatever is left of a rejected request's body
///
/// Frames are dropped as they arrive, so nothing is buffered whatever the
/// upload size.
async fn drain_body(body: Body) {
    let mut frames = body.into_data_stream();
    while let Some(frame) = frames.next().await {
        if let Err(e) = frame {
            tracing::debug!(error = %e, "failed to drain rejected request body");
            break;
        }
    }
}

/// Authentication middleware for protected routes
///
/// ```ignore
/// let protected = Router::new()
///     .route("/me", get(me))
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_authenticated));
/// ```
pub async fn require_authenticated(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match state.gate.authenticate(request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(err) => {
            if matches!(err, AppError::Unauthorized(_)) {
                let ctx = AuditContext::from_headers(request.headers());
                audit_log(&AuditEvent::InvalidToken {
                    reason: err.to_string(),
                    ip_address: ctx.ip_address,
                    user_agent: ctx.user_agent,
                });
            }
            drain_body(request.into_body()).await;
            Err(err)
        }
    }
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>;

/// Role gate; must sit behind [`require_authenticated`]
///
/// ```ignore
/// let owner_only = Router::new()
///     .route("/purge", post(purge))
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_role(&[UserRole::Owner])))
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_authenticated));
/// ```
pub fn require_role(
    allowed: &'static [UserRole],
) -> impl Fn(State<Arc<AppState>>, Request, Next) -> RoleMiddlewareFuture + Clone {
    move |_: State<Arc<AppState>>, request: Request, next: Next| {
        Box::pin(async move {
            let Some(user) = request.extensions().get::<AuthenticatedUser>().cloned() else {
                drain_body(request.into_body()).await;
                return Err(AppError::Unauthorized("user role not found".to_string()));
            };

            if user.has_any_role(allowed) {
                return Ok(next.run(request).await);
            }

            let ctx = AuditContext::from_headers(request.headers());
            audit_log(&AuditEvent::AccessDenied {
                user_id: Some(user.user_id),
                email: Some(user.email),
                resource: request.uri().path().to_string(),
                required_roles: allowed.iter().map(|r| r.as_str().to_string()).collect(),
                ip_address: ctx.ip_address,
                user_agent: ctx.user_agent,
            });

            drain_body(request.into_body()).await;
            Err(AppError::Forbidden("insufficient permissions".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::issue_access_token_at;
    use axum::http::HeaderValue;
    use chrono::Duration;
    use libris_core::{now_micros, MemoryUserDirectory, NewUser};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    async fn seeded_directory() -> (Arc<MemoryUserDirectory>, String) {
        let users = Arc::new(MemoryUserDirectory::new());
        let user = users
            .create(NewUser {
                email: "member@example.com".to_string(),
                password_hash: "unused".to_string(),
                first_name: "Mem".to_string(),
                last_name: "Ber".to_string(),
                role: UserRole::Member,
            })
            .await
            .unwrap();
        (users, user.id)
    }

    fn token_for(user_id: &str, issued_at: DateTime<Utc>) -> String {
        issue_access_token_at(
            &JwtConfig::default(),
            user_id,
            "member@example.com",
            UserRole::Member,
            issued_at,
        )
        .unwrap()
    }

    fn unauthorized_message(result: Result<AuthenticatedUser, AppError>) -> String {
        match result {
            Err(AppError::Unauthorized(msg)) => msg,
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }

    #[test]
    fn test_bearer_header_format() {
        let gate = StatelessAuthMiddleware::new(JwtConfig::default());

        assert_eq!(
            unauthorized_message(gate.authenticate(&HeaderMap::new())),
            "authorization header required"
        );

        for value in ["Bearer", "Basic abc", "bearer abc", "Bearer  abc", "Bearer a b", "Token"] {
            assert_eq!(
                unauthorized_message(gate.authenticate(&headers_with(value))),
                "invalid authorization header format",
                "{value}"
            );
        }

        assert_eq!(
            unauthorized_message(gate.authenticate(&headers_with("Bearer not.a.jwt"))),
            "invalid or expired token"
        );
    }

    #[test]
    fn test_stateless_gate_accepts_valid_token() {
        let gate = StatelessAuthMiddleware::new(JwtConfig::default());
        let issued_at = now_micros();
        let token = token_for("u1", issued_at);

        let user = gate
            .authenticate(&headers_with(&format!("Bearer {token}")))
            .unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.role, UserRole::Member);
        assert_eq!(user.issued_at, issued_at);
        assert!(!user.is_owner());
    }

    #[test]
    fn test_unknown_role_is_internal() {
        let claims = Claims {
            iss: "libris-api".to_string(),
            sub: "u1".to_string(),
            email: "x@example.com".to_string(),
            role: "admin".to_string(),
            iat: 0,
            exp: 0,
            iat_us: 0,
        };
        assert!(matches!(
            AuthenticatedUser::try_from(claims),
            Err(AppError::Internal { .. })
        ));
    }

    #[tokio::test]
    async fn test_revocation_aware_gate() {
        let (users, user_id) = seeded_directory().await;
        let gate = RevocationAwareAuthMiddleware::new(JwtConfig::default(), users.clone());
        let stateless = StatelessAuthMiddleware::new(JwtConfig::default());

        let cutoff = now_micros();
        let old = headers_with(&format!("Bearer {}", token_for(&user_id, cutoff - Duration::seconds(5))));
        let fresh = headers_with(&format!("Bearer {}", token_for(&user_id, cutoff)));

        assert!(gate.authenticate(&old).await.is_ok());

        users.invalidate_tokens(&user_id, cutoff).await.unwrap();

        assert_eq!(
            unauthorized_message(gate.authenticate(&old).await),
            "token has been invalidated"
        );
        assert!(gate.authenticate(&fresh).await.is_ok());

        // Stateless mode never consults the directory
        assert!(stateless.authenticate(&old).is_ok());
    }

    #[tokio::test]
    async fn test_revocation_aware_gate_unknown_user() {
        let (users, _) = seeded_directory().await;
        let gate = RevocationAwareAuthMiddleware::new(JwtConfig::default(), users);
        let headers = headers_with(&format!("Bearer {}", token_for("ghost", now_micros())));

        assert_eq!(
            unauthorized_message(gate.authenticate(&headers).await),
            "user not found"
        );
    }

    #[test]
    fn test_gate_from_config() {
        let users: Arc<dyn UserDirectory> = Arc::new(MemoryUserDirectory::new());
        let mut config = AuthConfig::default();

        assert_eq!(
            AuthGate::from_config(&config, users.clone()).mode(),
            RevocationMode::RevocationAware
        );

        config.revocation_mode = RevocationMode::Stateless;
        assert_eq!(
            AuthGate::from_config(&config, users).mode(),
            RevocationMode::Stateless
        );
    }

    #[test]
    fn test_has_any_role() {
        let user = AuthenticatedUser {
            user_id: "u1".to_string(),
            email: "owner@example.com".to_string(),
            role: UserRole::Owner,
            issued_at: now_micros(),
        };

        assert!(user.is_owner());
        assert!(user.has_any_role(&[UserRole::Owner]));
        assert!(user.has_any_role(&[UserRole::Member, UserRole::Owner]));
        assert!(!user.has_any_role(&[UserRole::Member]));
        assert!(!user.has_any_role(&[]));
    }
}
