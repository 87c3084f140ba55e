//! Authentication middleware for protecting routes
//!
//! Extracts and validates JWT tokens from the Authorization header, then
//! consults the revocation registry. On success, adds the session to
//! request extensions.

use super::jwt::{validate_access_token, Claims, JwtError};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::{ApiError, AppError};
use crate::state::AppState;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use stash_core::{StashError, UserId};
use std::sync::Arc;
use thiserror::Error;

/// Session established from a validated token
///
/// Added to request extensions by [`auth_middleware`]; extract it in
/// handlers with `Extension<AuthenticatedUser>`, or use [`CurrentUser`] to
/// get the typed identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Raw token subject
    pub subject: String,
    /// JWT token ID (for revocation)
    pub jti: String,
    /// Token expiry (Unix epoch)
    pub expires_at: u64,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            jti: claims.jti,
            expires_at: claims.exp,
        }
    }
}

/// Authentication middleware errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization Header")]
    MissingAuthHeader,

    #[error("Missing 'Bearer' type in 'Authorization' header")]
    InvalidAuthHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Revocation check failed: {0}")]
    RevocationUnavailable(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::ExpiredToken => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
            AuthError::InvalidToken => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TOKEN"),
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
            AuthError::RevocationUnavailable(msg) => {
                tracing::error!("Revocation check failed: {}", msg);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiError::internal_error()),
                )
                    .into_response();
            }
        };

        (status, Json(ApiError::new(code, self.to_string()))).into_response()
    }
}

/// Authentication middleware that requires a valid, unrevoked JWT
///
/// This middleware:
/// 1. Extracts the Authorization header
/// 2. Validates the Bearer scheme
/// 3. Validates the JWT signature, issuer and expiration
/// 4. Rejects tokens whose `jti` is in the revocation registry
/// 5. Adds [`AuthenticatedUser`] to request extensions
///
/// # Usage
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/profile", get(get_profile))
///     .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let ip_address = extract_ip_address(request.headers());
    let user_agent = extract_user_agent(request.headers());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let claims = match validate_access_token(&state.jwt_config, token.trim()) {
        Ok(c) => c,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                ip_address,
                user_agent,
                reason: e.to_string(),
            });
            return Err(AuthError::from(e));
        }
    };

    let user = AuthenticatedUser::from(claims);

    let revoked = state
        .revocations
        .is_revoked(&user.jti)
        .await
        .map_err(|e| AuthError::RevocationUnavailable(e.to_string()))?;
    if revoked {
        audit_log(&AuditEvent::InvalidToken {
            ip_address,
            user_agent,
            reason: "Token has been revoked".to_string(),
        });
        return Err(AuthError::TokenRevoked);
    }

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Typed identity of the caller
///
/// Resolves the session subject to a [`UserId`]; a subject that is not a
/// valid id is rejected with 401 "Invalid token identity".
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub session: AuthenticatedUser,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(AuthError::MissingAuthHeader.to_string()))?;

        let id = session
            .subject
            .parse::<UserId>()
            .map_err(StashError::from)?;

        Ok(Self { id, session })
    }
}
