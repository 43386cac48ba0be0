//! Authentication and authorization module
//!
//! - Password hashing with Argon2 and strength rules
//! - Access token signing and validation, refresh token generation
//! - Authentication service: register, login, refresh rotation, logout
//! - Request gates: authentication (stateless or revocation-aware) and roles

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;
pub mod sweeper;

pub use jwt::{issue_access_token, validate_access_token, Claims, JwtConfig, TokenError};
pub use middleware::{
    require_authenticated, require_role, AuthGate, AuthenticatedUser,
    RevocationAwareAuthMiddleware, StatelessAuthMiddleware,
};
pub use password::{validate_password_strength, PasswordConfig, PasswordError};
pub use service::{AuthResponse, AuthService, LoginRequest, RefreshRequest, RegisterRequest};
pub use sweeper::spawn_refresh_token_sweeper;
