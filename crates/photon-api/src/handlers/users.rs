//! User profile and moderation handlers

use crate::auth::{AuthenticatedUser, ChangePasswordRequest, ChangeRoleRequest, SetActiveRequest};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use photon_core::UserPublic;
use std::sync::Arc;
use uuid::Uuid;

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current user", body = UserPublic),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(Extension(auth): Extension<AuthenticatedUser>) -> Json<UserPublic> {
    Json(auth.user.to_public())
}

/// Change the current user's password
///
/// The access token used for this call is revoked and the refresh token
/// dropped; the client has to log in again with the new password.
#[utoipa::path(
    patch,
    path = "/api/users/password",
    tag = "users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = UserPublic),
        (status = 400, description = "Invalid new password", body = crate::error::ApiError),
        (status = 401, description = "Invalid old password", body = crate::error::ApiError),
        (status = 429, description = "Too many attempts"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<UserPublic>, AppError> {
    let user = state
        .auth
        .change_password(&auth.user, &auth.token, request)
        .await?;
    Ok(Json(user))
}

/// Ban or unban a user (admin only)
#[utoipa::path(
    patch,
    path = "/api/users/{id}/active",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = SetActiveRequest,
    responses(
        (status = 200, description = "Updated user", body = UserPublic),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_active_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<UserPublic>, AppError> {
    let user = state
        .auth
        .set_active(&auth.user, id, request.is_active)
        .await?;
    Ok(Json(user))
}

/// Change a user's role to `user` or `moderator` (admin only)
#[utoipa::path(
    patch,
    path = "/api/users/{id}/role",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = UserPublic),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
        (status = 400, description = "User already has this role", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_role_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeRoleRequest>,
) -> Result<Json<UserPublic>, AppError> {
    let user = state.auth.change_role(&auth.user, id, request.role).await?;
    Ok(Json(user))
}
