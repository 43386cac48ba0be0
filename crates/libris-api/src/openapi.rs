//! OpenAPI document served at `/api-docs/openapi.json`

use crate::auth::service::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest};
use crate::error::ApiError;
use crate::handlers::admin::PurgeResponse;
use crate::handlers::auth::LogoutResponse;
use crate::handlers::health::{HealthResponse, ReadinessChecks, ReadinessResponse};
use libris_core::{UserPublic, UserRole};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "libris API",
        description = "Authentication core of the libris library backend. \
                       Protected endpoints take `Authorization: Bearer <access_token>`."
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::health::readiness_check,
        crate::handlers::auth::register_handler,
        crate::handlers::auth::login_handler,
        crate::handlers::auth::refresh_handler,
        crate::handlers::auth::logout_handler,
        crate::handlers::auth::me_handler,
        crate::handlers::admin::purge_refresh_tokens_handler,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        RefreshRequest,
        AuthResponse,
        UserPublic,
        UserRole,
        LogoutResponse,
        PurgeResponse,
        HealthResponse,
        ReadinessResponse,
        ReadinessChecks,
        ApiError,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "auth", description = "Registration, login and token rotation"),
        (name = "admin", description = "Owner-only maintenance"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
