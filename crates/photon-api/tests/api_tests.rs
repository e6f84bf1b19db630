//! API Integration Tests
//!
//! Every test drives the full router with in-memory collaborators: user
//! store, revocation store and a recording mailer.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use photon_api::auth::{subject_claims, RevocationStore, StoreError};
use photon_api::testing::TestApp;
use photon_api::create_router_for_testing;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
    text: String,
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&bytes).to_string();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    Response {
        status,
        headers,
        body,
        text,
    }
}

fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn form_request(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// Path part of the last mailed link
async fn last_link_path(app: &TestApp) -> String {
    let link = app.mailer.last_link().await.expect("a mail was sent");
    link.strip_prefix("http://photon.test")
        .expect("link uses the public base url")
        .to_string()
}

async fn signup(app: &TestApp, username: &str) -> Value {
    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/auth/signup",
            json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "first_name": "Test",
                "last_name": "User",
                "password": "secret1",
            }),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    response.body
}

/// Sign up and follow the confirmation link
async fn signup_confirmed(app: &TestApp, username: &str) -> String {
    let body = signup(app, username).await;
    let path = last_link_path(app).await;
    let response = send(&app.router, get_request(&path, None)).await;
    assert_eq!(response.status, StatusCode::OK);
    body["user"]["id"].as_str().unwrap().to_string()
}

async fn login(app: &TestApp, username: &str, password: &str) -> Response {
    send(
        &app.router,
        form_request(
            "/api/auth/login",
            &format!("username={username}@example.com&password={password}"),
        ),
    )
    .await
}

async fn access_token(app: &TestApp, username: &str) -> String {
    let response = login(app, username, "secret1").await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    response.body["access_token"].as_str().unwrap().to_string()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let response = send(&app, get_request("/health", None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let response = send(&app, get_request("/ready", None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ready"], true);
    assert_eq!(response.body["checks"]["redis_configured"], false);
}

#[tokio::test]
async fn test_readiness_reports_shutdown() {
    let app = TestApp::new();
    app.state.set_ready(false);

    let response = send(&app.router, get_request("/ready", None)).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["ready"], false);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = create_router_for_testing();

    let response = send(&app, get_request("/api-docs/openapi.json", None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["paths"]["/api/auth/signup"].is_object());
}

// =============================================================================
// Signup and Login Tests
// =============================================================================

#[tokio::test]
async fn test_signup_first_user_is_admin() {
    let app = TestApp::new();

    let first = signup(&app, "alice").await;
    let second = signup(&app, "bob").await;

    assert_eq!(first["detail"], "User successfully created");
    assert_eq!(first["user"]["role"], "admin");
    assert_eq!(second["user"]["role"], "user");
    assert!(first["user"].get("password_hash").is_none());
    assert_eq!(app.mailer.sent().await.len(), 2);
}

#[tokio::test]
async fn test_signup_duplicate_is_conflict() {
    let app = TestApp::new();
    signup(&app, "alice").await;

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/auth/signup",
            json!({
                "username": "alice",
                "email": "other@example.com",
                "first_name": "Test",
                "last_name": "User",
                "password": "secret1",
            }),
            None,
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(
        response.body["detail"],
        "An account with the same email address or username already exists"
    );
}

#[tokio::test]
async fn test_signup_rejects_invalid_input() {
    let app = TestApp::new();

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/auth/signup",
            json!({
                "username": "a",
                "email": "not-an-email",
                "first_name": "Test",
                "last_name": "User",
                "password": "123",
            }),
            None,
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_unknown_email() {
    let app = TestApp::new();

    let response = login(&app, "ghost", "secret1").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Invalid email");
}

#[tokio::test]
async fn test_login_unverified_email() {
    let app = TestApp::new();
    signup(&app, "alice").await;

    let response = login(&app, "alice", "secret1").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Email not confirmed");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;

    let response = login(&app, "alice", "wrong-password").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Invalid password");
    assert_eq!(response.headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
}

#[tokio::test]
async fn test_login_success_stores_refresh_token() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;

    let response = login(&app, "alice", "secret1").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["token_type"], "bearer");
    assert!(response.body["access_token"].is_string());

    let stored = app
        .state
        .auth
        .resolve_current_user(response.body["access_token"].as_str().unwrap())
        .await
        .unwrap();
    assert_eq!(
        stored.refresh_token.as_deref(),
        response.body["refresh_token"].as_str()
    );
}

// =============================================================================
// Email Confirmation Tests
// =============================================================================

#[tokio::test]
async fn test_confirm_email_twice() {
    let app = TestApp::new();
    signup(&app, "alice").await;
    let path = last_link_path(&app).await;

    let first = send(&app.router, get_request(&path, None)).await;
    let second = send(&app.router, get_request(&path, None)).await;

    assert_eq!(first.body["message"], "Email confirmed");
    assert_eq!(second.body["message"], "Your email is already confirmed");
}

#[tokio::test]
async fn test_confirm_email_with_access_token_is_unprocessable() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;
    let token = access_token(&app, "alice").await;

    let response = send(
        &app.router,
        get_request(&format!("/api/auth/confirmed_email/{token}"), None),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["detail"], "Invalid token for email verification");
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_me_requires_bearer() {
    let app = TestApp::new();

    let response = send(&app.router, get_request("/api/users/me", None)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Not authenticated");
}

#[tokio::test]
async fn test_me_with_access_token() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;
    let token = access_token(&app, "alice").await;

    let response = send(&app.router, get_request("/api/users/me", Some(&token))).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["email"], "alice@example.com");
    assert_eq!(
        response.headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_email_token_never_authenticates() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;
    let email_token = app
        .state
        .auth
        .create_email_token(&subject_claims("alice@example.com"), None)
        .unwrap();

    let response = send(&app.router, get_request("/api/users/me", Some(&email_token))).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Could not validate credentials");
}

#[tokio::test]
async fn test_logout_blacklists_access_token() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;
    let token = access_token(&app, "alice").await;

    let response = send(&app.router, get_request("/api/auth/logout", Some(&token))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Successful exit");

    let response = send(&app.router, get_request("/api/users/me", Some(&token))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotation_and_reuse() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;
    let first = login(&app, "alice", "secret1").await.body;
    let t1 = first["refresh_token"].as_str().unwrap().to_string();

    // Tokens minted in the same second are byte-identical
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let rotated = send(&app.router, get_request("/api/auth/refresh_token", Some(&t1))).await;
    assert_eq!(rotated.status, StatusCode::OK);
    let t2 = rotated.body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(t1, t2);

    let reused = send(&app.router, get_request("/api/auth/refresh_token", Some(&t1))).await;
    assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reused.body["detail"], "Invalid refresh token");

    // The reuse wiped the stored token, so the newest one is dead too
    let after = send(&app.router, get_request("/api/auth/refresh_token", Some(&t2))).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_with_access_token_is_wrong_scope() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;
    let token = access_token(&app, "alice").await;

    let response = send(&app.router, get_request("/api/auth/refresh_token", Some(&token))).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Invalid scope for token");
}

// =============================================================================
// Password Reset Tests
// =============================================================================

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/auth/reset_password",
            json!({"email": "alice@example.com"}),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["timeout_link"]["seconds"], 86_400);

    let path = last_link_path(&app).await;
    assert!(path.starts_with("/api/auth/reset_password/"));

    let form = send(&app.router, get_request(&path, None)).await;
    assert_eq!(form.status, StatusCode::OK);
    assert!(form.text.contains("<form method=\"post\">"));

    let done = send(&app.router, form_request(&path, "password=newsecret")).await;
    assert_eq!(done.status, StatusCode::OK);
    assert_eq!(done.body, json!({"status": "ok"}));

    let again = send(&app.router, get_request(&path, None)).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.body["detail"], "The link is no longer active");

    assert_eq!(login(&app, "alice", "secret1").await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(login(&app, "alice", "newsecret").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_unknown_email() {
    let app = TestApp::new();

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/auth/reset_password",
            json!({"email": "ghost@example.com"}),
            None,
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Invalid email");
}

// =============================================================================
// Password Change Tests
// =============================================================================

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new();
    signup_confirmed(&app, "alice").await;
    let token = access_token(&app, "alice").await;

    let response = send(
        &app.router,
        json_request(
            "PATCH",
            "/api/users/password",
            json!({"old_password": "not-mine", "new_password": "newsecret"}),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["detail"], "Invalid old password");

    let response = send(
        &app.router,
        json_request(
            "PATCH",
            "/api/users/password",
            json!({"old_password": "secret1", "new_password": "newsecret"}),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.body["email"], "alice@example.com");

    // The session that changed the password is over
    let response = send(&app.router, get_request("/api/users/me", Some(&token))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = login(&app, "alice", "secret1").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = login(&app, "alice", "newsecret").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_requires_bearer() {
    let app = TestApp::new();

    let response = send(
        &app.router,
        json_request(
            "PATCH",
            "/api/users/password",
            json!({"old_password": "secret1", "new_password": "newsecret"}),
            None,
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Rate Limit Tests
// =============================================================================

fn login_from(ip: &str) -> Request<Body> {
    let mut request = form_request(
        "/api/auth/login",
        "username=ghost@example.com&password=secret1",
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", ip.parse().unwrap());
    request
}

#[tokio::test]
async fn test_login_is_rate_limited_per_ip() {
    let app = TestApp::with_rate_limits();

    for _ in 0..5 {
        let response = send(&app.router, login_from("10.0.0.1")).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let response = send(&app.router, login_from("10.0.0.1")).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Another client still gets through
    let response = send(&app.router, login_from("10.0.0.2")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_is_rate_limited_per_ip() {
    let app = TestApp::with_rate_limits();

    for _ in 0..10 {
        let mut request = json_request(
            "POST",
            "/api/auth/reset_password",
            json!({"email": "ghost@example.com"}),
            None,
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", "10.0.0.3".parse().unwrap());
        let response = send(&app.router, request).await;
        assert_ne!(response.status, StatusCode::TOO_MANY_REQUESTS);
    }

    let mut request = json_request(
        "POST",
        "/api/auth/reset_password",
        json!({"email": "ghost@example.com"}),
        None,
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", "10.0.0.3".parse().unwrap());
    let response = send(&app.router, request).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
}

// =============================================================================
// Role Tests
// =============================================================================

#[tokio::test]
async fn test_moderator_routes() {
    let app = TestApp::new();
    let admin_id = signup_confirmed(&app, "root").await;
    let moderator_id = signup_confirmed(&app, "mod").await;
    let plain_id = signup_confirmed(&app, "plain").await;

    let admin = access_token(&app, "root").await;
    let plain = access_token(&app, "plain").await;

    // A plain user cannot ban anyone
    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{moderator_id}/active"),
            json!({"is_active": false}),
            Some(&plain),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["detail"], "Access denied. Access open to \"user\"");

    // The admin promotes `mod`
    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{moderator_id}/role"),
            json!({"role": "moderator"}),
            Some(&admin),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["role"], "moderator");

    let moderator = access_token(&app, "mod").await;

    // Moderators can neither change roles nor ban
    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{plain_id}/role"),
            json!({"role": "moderator"}),
            Some(&moderator),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{plain_id}/active"),
            json!({"is_active": false}),
            Some(&moderator),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.body["detail"],
        "Access denied. Access open to \"moderator\""
    );

    // Not even against the admin
    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{admin_id}/active"),
            json!({"is_active": false}),
            Some(&moderator),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let response = send(&app.router, get_request("/api/users/me", Some(&admin))).await;
    assert_eq!(response.status, StatusCode::OK);

    // The admin bans `plain`
    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{plain_id}/active"),
            json!({"is_active": false}),
            Some(&admin),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["is_active"], false);

    // The banned user's still-valid token no longer works
    let response = send(&app.router, get_request("/api/users/me", Some(&plain))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["detail"], "Inactive user");
}

#[tokio::test]
async fn test_role_change_to_current_role() {
    let app = TestApp::new();
    signup_confirmed(&app, "root").await;
    let user_id = signup_confirmed(&app, "plain").await;
    let admin = access_token(&app, "root").await;

    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{user_id}/role"),
            json!({"role": "user"}),
            Some(&admin),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["detail"],
        "This user already has this role installed"
    );
}

#[tokio::test]
async fn test_admin_role_is_not_assignable() {
    let app = TestApp::new();
    signup_confirmed(&app, "root").await;
    let user_id = signup_confirmed(&app, "plain").await;
    let admin = access_token(&app, "root").await;

    let response = send(
        &app.router,
        json_request(
            "PATCH",
            &format!("/api/users/{user_id}/role"),
            json!({"role": "admin"}),
            Some(&admin),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Store Failure Tests
// =============================================================================

struct UnreachableStore;

#[async_trait]
impl RevocationStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_unreachable_store_fails_closed() {
    let app = TestApp::with_store(Arc::new(UnreachableStore));
    let token = app
        .state
        .auth
        .create_access_token(&subject_claims("alice@example.com"), None)
        .unwrap();

    let response = send(&app.router, get_request("/api/users/me", Some(&token))).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["code"], "STORE_UNAVAILABLE");
    assert!(!response.text.contains("connection refused"));
}
