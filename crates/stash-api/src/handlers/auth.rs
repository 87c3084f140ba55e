//! Authentication API handlers
//!
//! Provides HTTP endpoints for registration, login, logout and the caller's
//! own profile. A missing or unparsable JSON body is handled as `{}`.

use crate::audit::AuditContext;
use crate::auth::{
    AuthenticatedUser, CurrentUser, LoginRequest, LoginResponse, MessageResponse,
    ProfileResponse, RegisterRequest, RegisterResponse, UpdateProfileRequest,
    UpdateProfileResponse,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Register a new user account
///
/// # Responses
///
/// * `201 Created` - User registered, returns the new id
/// * `400 Bad Request` - Missing email/password, or email already exists
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = RegisterResponse),
        (status = 400, description = "Missing field or duplicate email", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let ctx = AuditContext::from_headers(&headers);

    let response = state.auth.register(request, &ctx).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with email and password
///
/// Unknown email and wrong password produce the same 401 response.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing email or password", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let ctx = AuditContext::from_headers(&headers);

    let response = state.auth.login(request, &ctx).await?;

    Ok(Json(response))
}

/// Logout the current session
///
/// Revokes the presented token; other tokens of the same user stay valid.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Missing, expired or revoked token", body = crate::error::ApiError),
        (status = 422, description = "Malformed token", body = crate::error::ApiError),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let ctx = AuditContext::from_headers(&headers);
    let response = state.auth.logout(&session, &ctx).await?;

    Ok(Json(response))
}

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = ProfileResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth.get_profile(user.id).await?;
    Ok(Json(profile))
}

/// Update the caller's email and/or password
///
/// Absent or empty fields are left unchanged.
#[utoipa::path(
    put,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UpdateProfileResponse),
        (status = 400, description = "Email already used by another user", body = crate::error::ApiError),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    headers: HeaderMap,
    body: Option<Json<UpdateProfileRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let ctx = AuditContext::from_headers(&headers);

    let response = state.auth.update_profile(user.id, request, &ctx).await?;

    Ok(Json(response))
}
