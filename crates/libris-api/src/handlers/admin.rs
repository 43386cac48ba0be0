//! Owner-only maintenance endpoints

use crate::audit::{audit_log, AuditEvent};
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Result of an expiry sweep
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurgeResponse {
    /// Number of expired refresh tokens removed
    pub deleted: u64,
}

/// Delete expired refresh tokens now instead of waiting for the sweeper
#[utoipa::path(
    post,
    path = "/api/v1/admin/refresh-tokens/purge",
    tag = "admin",
    responses(
        (status = 200, description = "Expired refresh tokens removed", body = PurgeResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Caller is not an owner", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn purge_refresh_tokens_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<PurgeResponse>, AppError> {
    let deleted = state.auth.purge_expired().await?;

    audit_log(&AuditEvent::RefreshTokensPurged {
        deleted,
        triggered_by: Some(user.user_id),
    });

    Ok(Json(PurgeResponse { deleted }))
}
