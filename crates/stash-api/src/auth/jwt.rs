//! JWT token generation and validation
//!
//! Implements JWT-based authentication with HMAC-SHA256 signing.
//! Access tokens carry the user id as subject plus a unique token id (`jti`)
//! that the revocation registry keys on.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use stash_core::config::{AuthConfig, DEFAULT_JWT_SECRET};
use stash_core::UserId;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - decimal user id
    pub sub: String,
    /// JWT ID - unique token identifier for revocation
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
}

/// JWT token generation and validation errors
///
/// Validation failures collapse to [`JwtError::ExpiredToken`] or
/// [`JwtError::InvalidToken`]; callers never see finer categories.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Access token expiration time in seconds
    pub access_expiration_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_JWT_SECRET.to_string(),
            access_expiration_secs: 900, // 15 minutes
            issuer: "stash-api".to_string(),
        }
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_expiration_secs: config.access_expiration_secs,
            issuer: config.jwt_issuer.clone(),
        }
    }
}

/// Generate a JWT access token for an authenticated user
///
/// # Arguments
///
/// * `config` - JWT configuration containing secret and expiration settings
/// * `user_id` - Identity the token is issued for
///
/// # Returns
///
/// * `Ok(String)` - Encoded JWT token
/// * `Err(JwtError)` - If token generation fails
///
/// # Example
///
/// ```no_run
/// use stash_api::auth::jwt::{generate_access_token, JwtConfig};
/// use stash_core::UserId;
///
/// let config = JwtConfig::default();
/// let token = generate_access_token(&config, UserId::new(1))
///     .expect("Failed to generate token");
/// ```
pub fn generate_access_token(config: &JwtConfig, user_id: UserId) -> Result<String, JwtError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + config.access_expiration_secs,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a JWT access token and extract claims
///
/// Checks signature, issuer and expiry (no leeway).
///
/// # Returns
///
/// * `Ok(Claims)` - Decoded and validated claims
/// * `Err(JwtError::ExpiredToken)` - Signature is fine but `exp` has passed
/// * `Err(JwtError::InvalidToken)` - Anything else
pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "sub", "iss"]);
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        _ => JwtError::InvalidToken,
    })?;

    Ok(token_data.claims)
}
