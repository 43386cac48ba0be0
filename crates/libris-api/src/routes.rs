//! API route definitions

use crate::auth::{require_authenticated, require_role};
use crate::handlers::{admin, auth};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use libris_core::UserRole;
use std::sync::Arc;

const OWNER_ONLY: &[UserRole] = &[UserRole::Owner];

/// Create API v1 routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_authenticated,
        ));

    // Owner-only routes; layers run bottom-up, so authentication comes first
    let owner_routes = Router::new()
        .route(
            "/admin/refresh-tokens/purge",
            post(admin::purge_refresh_tokens_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_role(OWNER_ONLY),
        ))
        .route_layer(middleware::from_fn_with_state(state, require_authenticated));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(owner_routes)
}
