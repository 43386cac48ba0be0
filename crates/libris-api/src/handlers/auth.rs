//! Authentication API handlers
//!
//! Provides HTTP endpoints for registration, login, token rotation,
//! logout and the caller's profile.

use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::auth::{AuthResponse, AuthenticatedUser, LoginRequest, RefreshRequest, RegisterRequest};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use libris_core::UserPublic;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Logout response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

/// Register a new member account
///
/// Any `role` in the body is ignored; new accounts are always `member`.
///
/// # Responses
///
/// * `201 Created` - Account created, tokens issued
/// * `400 Bad Request` - Malformed body, invalid email or weak password
/// * `409 Conflict` - Email already registered
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email already exists", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let ctx = AuditContext::from_headers(&headers);
    let email = request.email.clone();

    match state.auth.register(request).await {
        Ok(response) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: response.user.id.clone(),
                email: response.user.email.clone(),
                role: response.user.role.to_string(),
                ip_address: ctx.ip_address,
                user_agent: ctx.user_agent,
            });
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(err) => {
            audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: err.to_string(),
                ip_address: ctx.ip_address,
                user_agent: ctx.user_agent,
            });
            Err(err)
        }
    }
}

/// Login with email and password
///
/// Unknown email and wrong password get the same 401.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Malformed body", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let ctx = AuditContext::from_headers(&headers);
    let email = request.email.clone();

    match state.auth.login(request).await {
        Ok(response) => {
            audit_log(&AuditEvent::LoginSuccess {
                user_id: response.user.id.clone(),
                email: response.user.email.clone(),
                ip_address: ctx.ip_address,
                user_agent: ctx.user_agent,
            });
            Ok(Json(response))
        }
        Err(err) => {
            audit_log(&AuditEvent::LoginFailure {
                email,
                reason: err.to_string(),
                ip_address: ctx.ip_address,
                user_agent: ctx.user_agent,
            });
            Err(err)
        }
    }
}

/// Exchange a refresh token for a new token pair
///
/// The presented refresh token is consumed, and access tokens issued to the
/// user before this call stop working.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = AuthResponse),
        (status = 400, description = "Malformed body", body = crate::error::ApiError),
        (status = 401, description = "Invalid or expired refresh token", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let ctx = AuditContext::from_headers(&headers);

    match state.auth.refresh(&request.refresh_token).await {
        Ok(response) => {
            audit_log(&AuditEvent::TokenRefresh {
                user_id: response.user.id.clone(),
                email: response.user.email.clone(),
                ip_address: ctx.ip_address,
                user_agent: ctx.user_agent,
            });
            Ok(Json(response))
        }
        Err(err) => {
            audit_log(&AuditEvent::RefreshTokenRejected {
                reason: err.to_string(),
                ip_address: ctx.ip_address,
                user_agent: ctx.user_agent,
            });
            Err(err)
        }
    }
}

/// Logout from every session
///
/// Invalidates all access tokens of the caller and deletes their refresh tokens.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = LogoutResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let revoked = state.auth.logout(&user.user_id).await?;

    audit_log(&AuditEvent::Logout {
        user_id: user.user_id,
        email: user.email,
        refresh_tokens_revoked: revoked,
        ip_address: AuditContext::from_headers(&headers).ip_address,
    });

    Ok(Json(LogoutResponse {
        message: "logged out successfully".to_string(),
    }))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserPublic),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserPublic>, AppError> {
    let profile = state.auth.get_user(&user.user_id).await?;
    Ok(Json(profile))
}
