//! Security audit logging for authentication events
//!
//! Every event is emitted at INFO level on the `audit` target, so security
//! logs can be filtered and routed separately (`RUST_LOG=audit=info`).
//! Events never carry passwords or token material.
//!
//! # Example
//!
//! ```ignore
//! use libris_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id.clone(),
//!     email: user.email.clone(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//! });
//! ```

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: String,
        email: String,
        role: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    LoginSuccess {
        user_id: String,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Unknown email and wrong password are both recorded here
    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Refresh token exchanged for a new pair
    TokenRefresh {
        user_id: String,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Refresh token unknown, expired, or lost a concurrent rotation
    RefreshTokenRejected {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    Logout {
        user_id: String,
        email: String,
        refresh_tokens_revoked: u64,
        ip_address: Option<String>,
    },

    /// Invalid, expired or revoked access token presented
    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Authenticated caller lacks the required role
    AccessDenied {
        user_id: Option<String>,
        email: Option<String>,
        resource: String,
        required_roles: Vec<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Expired refresh tokens swept, by the background task or on request
    RefreshTokensPurged {
        deleted: u64,
        triggered_by: Option<String>,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshTokenRejected { .. } => "Refresh token rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::RefreshTokensPurged { .. } => "Expired refresh tokens purged",
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::RegistrationSuccess { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::RefreshTokenRejected { ip_address, .. }
            | AuditEvent::Logout { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. }
            | AuditEvent::AccessDenied { ip_address, .. } => ip_address.as_deref(),
            AuditEvent::RefreshTokensPurged { .. } => None,
        }
    }
}

/// Client context pulled from request headers for audit records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Log a security audit event
///
/// The whole event is serialized into the `event` field so log
/// aggregators get the same JSON shape regardless of variant:
///
/// ```json
/// {"event_type":"login_failure","email":"user@example.com","reason":"unknown email","ip_address":"192.168.1.1","user_agent":null}
/// ```
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %Utc::now(),
        event = %event_json,
        ip_address = ?event.ip_address(),
        "{}",
        event.summary()
    );
}

/// Extract the client IP from proxy headers
///
/// Takes the first hop of `X-Forwarded-For`, then `X-Real-IP`.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(first_ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
