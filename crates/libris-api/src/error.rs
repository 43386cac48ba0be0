//! API error handling
//!
//! Every failure leaves the API as `{error, message, code}`. Internal
//! failures keep their cause for the log and show clients a generic message.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use libris_core::LibrisError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::jwt::TokenError;
use crate::auth::password::PasswordError;

/// API error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error kind, e.g. `UNAUTHORIZED`
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Numeric application error code
    pub code: u16,
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}: {source}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Wrap a primitive failure with a description for the log
    pub fn internal(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::Internal {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Numeric application code carried in the response body
    pub fn code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 1001,
            AppError::NotFound(_) => 1002,
            AppError::Unauthorized(_) => 1003,
            AppError::Forbidden(_) => 1004,
            AppError::AlreadyExists(_) => 1005,
            AppError::Internal { .. } => 1006,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Response body for this error; internal details never reach it
    pub fn to_api_error(&self) -> ApiError {
        let message = match self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::AlreadyExists(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::Internal { .. } => "internal server error".to_string(),
        };

        ApiError {
            error: self.kind().to_string(),
            message,
            code: self.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal { message, source } = &self {
            tracing::error!(code = self.code(), error = ?source, "{message}");
        }

        (self.status(), Json(self.to_api_error())).into_response()
    }
}

impl From<LibrisError> for AppError {
    fn from(err: LibrisError) -> Self {
        match err {
            LibrisError::Duplicate(what) => AppError::AlreadyExists(format!("{what} already exists")),
            LibrisError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            other => AppError::internal("storage operation failed", other),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::internal("password hashing failed", err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(_) => AppError::internal("token signing failed", err),
            TokenError::InvalidToken | TokenError::ExpiredToken => {
                AppError::Unauthorized("invalid or expired token".to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
