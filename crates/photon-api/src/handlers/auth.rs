//! Authentication API handlers
//!
//! Thin wrappers: extract, call [`crate::auth::AuthService`], serialize.

use crate::auth::{
    bearer_token, AuthenticatedUser, EmailRequest, LoginForm, MessageResponse, NewPasswordForm,
    ResetPasswordResponse, SignupRequest, SignupResponse, StatusResponse, TokenResponse,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    Extension, Form, Json,
};
use std::sync::Arc;
use validator::Validate;

/// Register a new user account
///
/// The first account becomes `admin`. A confirmation link is mailed to the
/// given address; login is refused until it is followed.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = SignupResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email or username taken", body = crate::error::ApiError),
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .signup(request, &state.config.server.public_base_url)
        .await?;

    let response = SignupResponse {
        user: user.to_public(),
        detail: "User successfully created".to_string(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with email and password
///
/// OAuth2 password form: `username` carries the email address.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid email, unconfirmed email or wrong password", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AppError> {
    let tokens = state.auth.login(&form.username, &form.password).await?;
    Ok(Json(tokens))
}

/// Logout current session
///
/// Blacklists the presented access token and drops the stored refresh token.
#[utoipa::path(
    get,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth.logout(&auth.user, &auth.token).await?;
    Ok(Json(MessageResponse::new("Successful exit")))
}

/// Rotate tokens
///
/// The bearer credential here is the refresh token, not an access token.
#[utoipa::path(
    get,
    path = "/api/auth/refresh_token",
    tag = "auth",
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Invalid or reused refresh token", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_token_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    let token = bearer_token(&headers)?;
    let tokens = state.auth.refresh(token).await?;
    Ok(Json(tokens))
}

/// Confirm an email address from a mailed link
#[utoipa::path(
    get,
    path = "/api/auth/confirmed_email/{token}",
    tag = "auth",
    params(("token" = String, Path, description = "Email token from the confirmation link")),
    responses(
        (status = 200, description = "Email confirmed", body = MessageResponse),
        (status = 400, description = "Verification error", body = crate::error::ApiError),
        (status = 422, description = "Invalid or expired link", body = crate::error::ApiError),
    )
)]
pub async fn confirmed_email_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    Ok(Json(state.auth.confirm_email(&token).await?))
}

/// Request a password reset link
#[utoipa::path(
    post,
    path = "/api/auth/reset_password",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset link sent", body = ResetPasswordResponse),
        (status = 401, description = "Invalid email", body = crate::error::ApiError),
    )
)]
pub async fn request_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))?;

    let response = state
        .auth
        .request_password_reset(&request.email, &state.config.server.public_base_url)
        .await?;

    Ok(Json(response))
}

const RESET_FORM: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Reset password</title>
</head>
<body>
  <h1>Reset password</h1>
  <p>Hello, {username}. Choose a new password (6 to 20 characters).</p>
  <form method="post">
    <input type="password" name="password" minlength="6" maxlength="20" required>
    <button type="submit">Save</button>
  </form>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            c => c.to_string(),
        })
        .collect()
}

/// Password reset form
///
/// Served only while the link is live and unused.
#[utoipa::path(
    get,
    path = "/api/auth/reset_password/{token}",
    tag = "auth",
    params(("token" = String, Path, description = "Email token from the reset link")),
    responses(
        (status = 200, description = "HTML form", body = String, content_type = "text/html"),
        (status = 400, description = "Link no longer active", body = crate::error::ApiError),
        (status = 422, description = "Invalid or expired link", body = crate::error::ApiError),
    )
)]
pub async fn reset_form_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Html<String>, AppError> {
    let user = state.auth.check_reset_link(&token).await?;
    Ok(Html(RESET_FORM.replace("{username}", &escape_html(&user.username))))
}

/// Submit a new password through a reset link
#[utoipa::path(
    post,
    path = "/api/auth/reset_password/{token}",
    tag = "auth",
    params(("token" = String, Path, description = "Email token from the reset link")),
    request_body(content = NewPasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Password changed", body = StatusResponse),
        (status = 400, description = "Link no longer active or invalid password", body = crate::error::ApiError),
        (status = 422, description = "Invalid or expired link", body = crate::error::ApiError),
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Form(form): Form<NewPasswordForm>,
) -> Result<Json<StatusResponse>, AppError> {
    state.auth.reset_password(&token, form).await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}
