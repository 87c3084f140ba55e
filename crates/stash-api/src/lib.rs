//! Stash API - REST server
//!
//! Provides HTTP endpoints for account registration, JWT sessions with
//! logout, and per-user item storage.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod items;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// OpenAPI document for every endpoint
#[derive(OpenApi)]
#[openapi(
    info(title = "Stash API", description = "Accounts, JWT sessions and per-user items"),
    paths(
        handlers::health::service_status,
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::health::prometheus_metrics,
        handlers::auth::register_handler,
        handlers::auth::login_handler,
        handlers::auth::logout_handler,
        handlers::auth::get_profile_handler,
        handlers::auth::update_profile_handler,
        handlers::items::list_items,
        handlers::items::create_item,
        handlers::items::get_item,
        handlers::items::update_item,
        handlers::items::delete_item,
    ),
    components(schemas(
        error::ApiError,
        auth::RegisterRequest,
        auth::RegisterResponse,
        auth::LoginRequest,
        auth::LoginResponse,
        auth::MessageResponse,
        auth::ProfileResponse,
        auth::UpdateProfileRequest,
        auth::UpdateProfileResponse,
        items::CreateItemRequest,
        items::UpdateItemRequest,
        items::ItemResponse,
        items::ItemAckResponse,
        handlers::health::StatusResponse,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::health::ReadinessChecks,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "Registration, login, logout and profile"),
        (name = "items", description = "Items owned by the caller"),
        (name = "health", description = "Probes and metrics"),
    )
)]
pub struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
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

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// CORS policy: an empty origin list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build the application router over shared state
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .merge(routes::api_routes(state.clone()))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Configuration used by [`create_router_for_testing`]
///
/// Cheapest Argon2 parameters, database-backed revocation over the
/// in-memory store.
#[cfg(feature = "test-utils")]
pub fn testing_config() -> stash_core::AppConfig {
    let mut config = stash_core::AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.auth.password = stash_core::PasswordParams {
        memory_cost: 8,
        time_cost: 1,
        parallelism: 1,
    };
    config
}

/// Router over a fresh in-memory database
#[cfg(feature = "test-utils")]
pub async fn create_router_for_testing() -> anyhow::Result<Router> {
    create_router_for_testing_with(testing_config()).await
}

/// Router over a fresh in-memory database with the given configuration
#[cfg(feature = "test-utils")]
pub async fn create_router_for_testing_with(config: stash_core::AppConfig) -> anyhow::Result<Router> {
    let store = stash_core::SqliteStore::in_memory().await?;
    let state = Arc::new(AppState::new(config, store)?);
    Ok(create_router(state))
}
