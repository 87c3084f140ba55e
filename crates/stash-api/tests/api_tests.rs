//! API Integration Tests
//!
//! Every test drives the real router over a fresh in-memory SQLite database.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use stash_api::auth::jwt::Claims;
use stash_api::{create_router_for_testing, create_router_for_testing_with, testing_config};
use stash_core::RevocationBackend;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request and decode the JSON response body
async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, json)
}

async fn app() -> Router {
    create_router_for_testing().await.unwrap()
}

async fn register(app: &Router, email: &str, password: &str) -> i64 {
    let (status, json) = send(
        app,
        create_json_request(
            "POST",
            "/auth/register",
            None,
            Some(json!({"email": email, "password": password})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_i64().unwrap()
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, json) = send(
        app,
        create_json_request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": email, "password": password})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["access_token"].as_str().unwrap().to_string()
}

async fn create_item(app: &Router, token: &str, name: &str, description: &str) -> i64 {
    let (status, json) = send(
        app,
        create_json_request(
            "POST",
            "/items/",
            Some(token),
            Some(json!({"name": name, "description": description})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_i64().unwrap()
}

fn signed_token(sub: &str, iat: u64, exp: u64) -> String {
    let config = testing_config();
    let claims = Claims {
        iss: config.auth.jwt_issuer.clone(),
        sub: sub.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        iat,
        exp,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.auth.jwt_secret.as_bytes()),
    )
    .unwrap()
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_service_status() {
    let app = app().await;

    for uri in ["/auth/", "/auth"] {
        let (status, json) = send(&app, create_json_request("GET", uri, None, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "running");
        assert_eq!(json["current_date"].as_str().unwrap().len(), 10);
        assert_eq!(json["current_time"].as_str().unwrap().len(), 8);
    }
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = app().await;

    let (status, json) = send(&app, create_json_request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());

    let (status, json) = send(&app, create_json_request("GET", "/ready", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["database"], true);
}

async fn metrics_text(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(create_json_request("GET", "/metrics", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app().await;
    send(&app, create_json_request("GET", "/health", None, None)).await;

    let text = metrics_text(&app).await;
    assert!(text.contains("stash_http_requests_total"));
    assert!(text.contains(r#"endpoint="/health""#));
}

#[tokio::test]
async fn test_metrics_series_bounded_by_routes() {
    let app = app().await;

    for i in 0..50 {
        let (status, _) = send(
            &app,
            create_json_request("GET", &format!("/nope-{i}"), None, None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    for id in ["7", "8", "abc"] {
        send(
            &app,
            create_json_request("GET", &format!("/items/{id}"), None, None),
        )
        .await;
    }

    let text = metrics_text(&app).await;
    let counters: Vec<&str> = text
        .lines()
        .filter(|line| line.starts_with("stash_http_requests_total{"))
        .collect();

    assert!(!text.contains("nope-"));
    assert_eq!(
        counters
            .iter()
            .filter(|line| line.contains(r#"endpoint="unmatched""#))
            .count(),
        1
    );
    assert_eq!(
        counters
            .iter()
            .filter(|line| line.contains(r#"endpoint="/items/:id""#))
            .count(),
        1
    );
    assert_eq!(counters.len(), 2);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = app().await;

    let (status, json) = send(
        &app,
        create_json_request("GET", "/api-docs/openapi.json", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/auth/login"].is_object());
}

#[tokio::test]
async fn test_security_headers_on_rejection() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(create_json_request("GET", "/items/", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

// =============================================================================
// Authentication API Tests
// =============================================================================

#[tokio::test]
async fn test_register_login_resolves_same_user() {
    let app = app().await;
    let id = register(&app, "alice@example.com", "wonderland").await;
    let token = login(&app, "alice@example.com", "wonderland").await;

    let (status, json) = send(
        &app,
        create_json_request("GET", "/auth/profile", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id);
    assert_eq!(json["email"], "alice@example.com");
    assert!(json["created_at"].is_string());
}

#[tokio::test]
async fn test_login_response_shape() {
    let app = app().await;
    register(&app, "a@example.com", "pw").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "a@example.com", "password": "pw"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Login successful");
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 900);
}

#[tokio::test]
async fn test_register_missing_fields() {
    let app = app().await;

    let bodies = [
        None,
        Some(json!({})),
        Some(json!({"email": "a@example.com"})),
        Some(json!({"email": "", "password": "pw"})),
    ];
    for body in bodies {
        let (status, json) = send(
            &app,
            create_json_request("POST", "/auth/register", None, body),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Email and password are required");
    }
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let app = app().await;
    register(&app, "dup@example.com", "first").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/auth/register",
            None,
            Some(json!({"email": "dup@example.com", "password": "second"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Email already exists");
}

#[tokio::test]
async fn test_login_failures_identical() {
    let app = app().await;
    register(&app, "a@example.com", "right").await;

    let wrong_password = send(
        &app,
        create_json_request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "a@example.com", "password": "wrong"})),
        ),
    )
    .await;
    let unknown_email = send(
        &app,
        create_json_request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "nobody@example.com", "password": "right"})),
        ),
    )
    .await;

    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.1["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_logout_revokes_only_that_token() {
    let app = app().await;
    register(&app, "a@example.com", "pw").await;
    let first = login(&app, "a@example.com", "pw").await;
    let second = login(&app, "a@example.com", "pw").await;

    let (status, json) = send(
        &app,
        create_json_request("POST", "/auth/logout", Some(&first), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Logout successful");

    let (status, json) = send(
        &app,
        create_json_request("GET", "/auth/profile", Some(&first), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Token has been revoked");

    let (status, _) = send(
        &app,
        create_json_request("GET", "/auth/profile", Some(&second), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_with_memory_registry() {
    let mut config = testing_config();
    config.auth.revocation_backend = RevocationBackend::Memory;
    let app = create_router_for_testing_with(config).await.unwrap();

    register(&app, "a@example.com", "pw").await;
    let token = login(&app, "a@example.com", "pw").await;

    send(
        &app,
        create_json_request("POST", "/auth/logout", Some(&token), None),
    )
    .await;

    let (status, json) = send(
        &app,
        create_json_request("GET", "/items/", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Token has been revoked");
}

#[tokio::test]
async fn test_token_failure_responses() {
    let app = app().await;

    // No header
    let (status, json) = send(&app, create_json_request("GET", "/items/", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Missing Authorization Header");

    // Wrong scheme
    let request = Request::builder()
        .uri("/items/")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        json["message"],
        "Missing 'Bearer' type in 'Authorization' header"
    );

    // Malformed token
    let (status, json) = send(
        &app,
        create_json_request("GET", "/items/", Some("not.a.jwt"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["message"], "Invalid token");

    // Expired token
    let now = now();
    let expired = signed_token("1", now - 7200, now - 3600);
    let (status, json) = send(
        &app,
        create_json_request("GET", "/items/", Some(&expired), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Token has expired");
}

#[tokio::test]
async fn test_invalid_token_identity() {
    let app = app().await;
    let now = now();
    let token = signed_token("not-a-user-id", now, now + 600);

    let (status, json) = send(
        &app,
        create_json_request("GET", "/auth/profile", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid token identity");

    // Logout only needs the token id, not a resolvable identity
    let (status, _) = send(
        &app,
        create_json_request("POST", "/auth/logout", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_profile_of_unknown_user() {
    let app = app().await;
    let now = now();
    let token = signed_token("987654", now, now + 600);

    let (status, json) = send(
        &app,
        create_json_request("GET", "/auth/profile", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "User not found");

    // Creating an item for the same vanished user answers the same way
    let (status, json) = send(
        &app,
        create_json_request("POST", "/items/", Some(&token), Some(json!({"name": "n"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "User not found");
}

#[tokio::test]
async fn test_profile_email_collision() {
    let app = app().await;
    let a = register(&app, "a@example.com", "pw").await;
    register(&app, "b@example.com", "pw").await;
    let token = login(&app, "a@example.com", "pw").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "PUT",
            "/auth/profile",
            Some(&token),
            Some(json!({"email": "b@example.com"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Email already used by another user");

    let (_, json) = send(
        &app,
        create_json_request("GET", "/auth/profile", Some(&token), None),
    )
    .await;
    assert_eq!(json["id"], a);
    assert_eq!(json["email"], "a@example.com");
}

#[tokio::test]
async fn test_profile_update() {
    let app = app().await;
    let a = register(&app, "a@example.com", "old-pw").await;
    let token = login(&app, "a@example.com", "old-pw").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "PUT",
            "/auth/profile",
            Some(&token),
            Some(json!({"email": "new@example.com", "password": "new-pw"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Profile updated");
    assert_eq!(json["id"], a);
    assert_eq!(json["email"], "new@example.com");

    login(&app, "new@example.com", "new-pw").await;

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "a@example.com", "password": "old-pw"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Item API Tests
// =============================================================================

#[tokio::test]
async fn test_item_create_get_update() {
    let app = app().await;
    register(&app, "a@example.com", "pw").await;
    let token = login(&app, "a@example.com", "pw").await;

    let id = create_item(&app, &token, "x", "y").await;

    let uri = format!("/items/{id}");
    let (status, json) = send(&app, create_json_request("GET", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"id": id, "name": "x", "description": "y"}));

    let (status, json) = send(
        &app,
        create_json_request("PUT", &uri, Some(&token), Some(json!({"description": "z"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Item updated");
    assert_eq!(json["id"], id);

    let (_, json) = send(&app, create_json_request("GET", &uri, Some(&token), None)).await;
    assert_eq!(json, json!({"id": id, "name": "x", "description": "z"}));
}

#[tokio::test]
async fn test_item_list_and_delete() {
    let app = app().await;
    register(&app, "a@example.com", "pw").await;
    let token = login(&app, "a@example.com", "pw").await;

    let first = create_item(&app, &token, "one", "").await;
    let second = create_item(&app, &token, "two", "").await;

    let (status, json) = send(&app, create_json_request("GET", "/items", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![first, second]);

    let uri = format!("/items/{first}");
    let (status, json) = send(&app, create_json_request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Item deleted");

    let (status, _) = send(&app, create_json_request("GET", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_item_requires_name() {
    let app = app().await;
    register(&app, "a@example.com", "pw").await;
    let token = login(&app, "a@example.com", "pw").await;

    let (status, json) = send(
        &app,
        create_json_request("POST", "/items/", Some(&token), Some(json!({"description": "d"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Name is required");
}

#[tokio::test]
async fn test_owner_field_in_body_is_ignored() {
    let app = app().await;
    let a = register(&app, "a@example.com", "pw").await;
    register(&app, "b@example.com", "pw").await;
    let token_b = login(&app, "b@example.com", "pw").await;
    let token_a = login(&app, "a@example.com", "pw").await;

    send(
        &app,
        create_json_request(
            "POST",
            "/items/",
            Some(&token_b),
            Some(json!({"name": "sneaky", "user_id": a})),
        ),
    )
    .await;

    let (_, json) = send(&app, create_json_request("GET", "/items/", Some(&token_a), None)).await;
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_foreign_item_forbidden() {
    let app = app().await;
    register(&app, "a@example.com", "pw").await;
    register(&app, "b@example.com", "pw").await;
    let token_a = login(&app, "a@example.com", "pw").await;
    let token_b = login(&app, "b@example.com", "pw").await;

    let id = create_item(&app, &token_a, "mine", "private").await;
    let uri = format!("/items/{id}");

    let (status, json) = send(&app, create_json_request("GET", &uri, Some(&token_b), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Unauthorized");

    let (status, _) = send(
        &app,
        create_json_request("PUT", &uri, Some(&token_b), Some(json!({"name": "theirs"}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, create_json_request("DELETE", &uri, Some(&token_b), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, json) = send(&app, create_json_request("GET", "/items/", Some(&token_b), None)).await;
    assert_eq!(json, json!([]));

    // Untouched for the owner
    let (status, json) = send(&app, create_json_request("GET", &uri, Some(&token_a), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "mine");
}

#[tokio::test]
async fn test_foreign_item_hidden_when_configured() {
    let mut config = testing_config();
    config.items.hide_foreign_items = true;
    let app = create_router_for_testing_with(config).await.unwrap();

    register(&app, "a@example.com", "pw").await;
    register(&app, "b@example.com", "pw").await;
    let token_a = login(&app, "a@example.com", "pw").await;
    let token_b = login(&app, "b@example.com", "pw").await;

    let id = create_item(&app, &token_a, "mine", "").await;

    let (status, json) = send(
        &app,
        create_json_request("GET", &format!("/items/{id}"), Some(&token_b), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Item not found");
}

#[tokio::test]
async fn test_missing_item_not_found() {
    let app = app().await;
    register(&app, "a@example.com", "pw").await;
    let token = login(&app, "a@example.com", "pw").await;

    for uri in ["/items/424242", "/items/abc"] {
        for method in ["GET", "PUT", "DELETE"] {
            let (status, json) = send(
                &app,
                create_json_request(method, uri, Some(&token), Some(json!({"name": "n"}))),
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(json["message"], "Item not found");
        }
    }
}
