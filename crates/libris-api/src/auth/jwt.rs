//! JWT token generation and validation
//!
//! Access tokens are HMAC-SHA256 signed and carry the user's id, email and
//! role. Refresh tokens are opaque random strings; only their SHA-256
//! digest is ever persisted.

use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use libris_core::{now_micros, AuthConfig, UserRole};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Entropy of a refresh token in bytes
const REFRESH_TOKEN_BYTES: usize = 32;

/// JWT Claims structure containing user information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// User's email address
    pub email: String,
    /// User's role (owner, member)
    pub role: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    /// Issued at (Unix microseconds), compared against revocation cutoffs
    pub iat_us: i64,
}

impl Claims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.iat_us)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode JWT: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Access token lifetime in seconds
    pub access_expiration_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_expiration_secs: config.access_token_ttl_secs(),
            issuer: config.issuer.clone(),
        }
    }
}

/// Generate a signed access token for a user, issued now
pub fn issue_access_token(
    config: &JwtConfig,
    user_id: &str,
    email: &str,
    role: UserRole,
) -> Result<String, TokenError> {
    issue_access_token_at(config, user_id, email, role, now_micros())
}

/// Generate a signed access token with an explicit issue instant
///
/// `issued_at` is kept to the microsecond in `iat_us`; the standard
/// second-resolution `iat`/`exp` claims are derived from it.
pub fn issue_access_token_at(
    config: &JwtConfig,
    user_id: &str,
    email: &str,
    role: UserRole,
    issued_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    let iat = issued_at.timestamp();
    let ttl = i64::try_from(config.access_expiration_secs).unwrap_or(i64::MAX);

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        email: email.to_string(),
        role: role.as_str().to_string(),
        iat,
        exp: iat.saturating_add(ttl),
        iat_us: issued_at.timestamp_micros(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate an access token and extract its claims
pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<Claims, TokenError> {
    validate_access_token_at(config, token, Utc::now())
}

/// Validate an access token against an explicit current time
///
/// Only HS256 is accepted; any other declared algorithm, including
/// asymmetric ones and `none`, fails as `InvalidToken`. A token whose
/// `exp` equals the current second is already expired.
pub fn validate_access_token_at(
    config: &JwtConfig,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(kind = ?e.kind(), "access token rejected");
        TokenError::InvalidToken
    })?;

    let claims = token_data.claims;
    if claims.issued_at().is_none() {
        return Err(TokenError::InvalidToken);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenError::ExpiredToken);
    }

    Ok(claims)
}

/// Generate an opaque refresh token from the OS CSPRNG
///
/// 32 random bytes, URL-safe base64 without padding (43 characters).
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 digest of a refresh token, the form kept in storage
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            access_expiration_secs: 3600,
            issuer: "libris-api".to_string(),
        }
    }

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
    }

    #[test]
    fn test_generate_and_validate_token() {
        let config = config();
        let issued_at = now_micros();

        let token = issue_access_token_at(
            &config,
            "user-1",
            "alice@example.com",
            UserRole::Member,
            issued_at,
        )
        .expect("Failed to generate token");

        let claims = validate_access_token(&config, &token).expect("Failed to validate token");

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, "member");
        assert_eq!(claims.iss, "libris-api");
        assert_eq!(claims.issued_at(), Some(issued_at));
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_invalid_token() {
        let result = validate_access_token(&config(), "invalid.token.here");
        assert!(matches!(result, Err(TokenError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtConfig {
            secret: "secret2".to_string(),
            ..config()
        };
        let token = issue_access_token(&config(), "u", "a@b.io", UserRole::Owner).unwrap();

        assert!(matches!(
            validate_access_token(&other, &token),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn test_wrong_issuer() {
        let other = JwtConfig {
            issuer: "someone-else".to_string(),
            ..config()
        };
        let token = issue_access_token(&other, "u", "a@b.io", UserRole::Owner).unwrap();

        assert!(matches!(
            validate_access_token(&config(), &token),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn test_tampered_payload() {
        let config = config();
        let token = issue_access_token(&config, "u", "a@b.io", UserRole::Member).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = Claims {
            iss: config.issuer.clone(),
            sub: "u".to_string(),
            email: "a@b.io".to_string(),
            role: "owner".to_string(),
            iat: 0,
            exp: i64::MAX / 2,
            iat_us: 0,
        };
        let forged_payload = b64(&serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            validate_access_token(&config, &forged),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let config = config();
        let issued_at = now_micros();
        let token =
            issue_access_token_at(&config, "u", "a@b.io", UserRole::Member, issued_at).unwrap();
        let claims = validate_access_token_at(&config, &token, issued_at).unwrap();
        let exp = DateTime::from_timestamp(claims.exp, 0).unwrap();

        // Last valid second
        assert!(validate_access_token_at(&config, &token, exp - Duration::seconds(1)).is_ok());

        // exp == now is already expired
        assert!(matches!(
            validate_access_token_at(&config, &token, exp),
            Err(TokenError::ExpiredToken)
        ));
        assert!(matches!(
            validate_access_token_at(&config, &token, exp + Duration::hours(1)),
            Err(TokenError::ExpiredToken)
        ));
    }

    #[test]
    fn test_expired_token() {
        let config = config();
        let issued_at = now_micros() - Duration::hours(2);
        let token =
            issue_access_token_at(&config, "u", "a@b.io", UserRole::Member, issued_at).unwrap();

        assert!(matches!(
            validate_access_token(&config, &token),
            Err(TokenError::ExpiredToken)
        ));
    }

    #[test]
    fn test_rejects_other_hmac_algorithm() {
        let config = config();
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: config.issuer.clone(),
            sub: "u".to_string(),
            email: "a@b.io".to_string(),
            role: "owner".to_string(),
            iat: now,
            exp: now + 3600,
            iat_us: now * 1_000_000,
        };

        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            validate_access_token(&config, &token),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn test_rejects_none_algorithm() {
        let config = config();
        let now = Utc::now().timestamp();
        let header = b64(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = b64(
            serde_json::json!({
                "iss": config.issuer,
                "sub": "u",
                "email": "a@b.io",
                "role": "owner",
                "iat": now,
                "exp": now + 3600,
                "iat_us": now * 1_000_000,
            })
            .to_string()
            .as_bytes(),
        );

        for token in [format!("{header}.{payload}."), format!("{header}.{payload}")] {
            assert!(matches!(
                validate_access_token(&config, &token),
                Err(TokenError::InvalidToken)
            ));
        }
    }

    #[test]
    fn test_rejects_asymmetric_header() {
        // HMAC signature computed with the shared secret but labelled RS256
        let config = config();
        let token = issue_access_token(&config, "u", "a@b.io", UserRole::Member).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let header = b64(br#"{"alg":"RS256","typ":"JWT"}"#);
        let relabelled = format!("{header}.{}.{}", parts[1], parts[2]);

        assert!(matches!(
            validate_access_token(&config, &relabelled),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn test_refresh_token_shape_and_uniqueness() {
        let tokens: HashSet<String> = (0..64).map(|_| generate_refresh_token()).collect();
        assert_eq!(tokens.len(), 64);

        for token in &tokens {
            assert_eq!(token.len(), 43);
            let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(token)
                .unwrap();
            assert_eq!(decoded.len(), REFRESH_TOKEN_BYTES);
        }
    }

    #[test]
    fn test_hash_refresh_token() {
        let digest = hash_refresh_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_refresh_token("abd"), digest);
    }
}
