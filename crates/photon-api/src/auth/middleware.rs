//! Authentication middleware for protecting routes
//!
//! `auth_middleware` turns the `Authorization: Bearer` header into an
//! [`AuthenticatedUser`] request extension. `require_role` layers an
//! [`AccessPolicy`] on top of it.

use super::policy::AccessPolicy;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use photon_core::{User, UserRole};
use std::sync::Arc;

pub const NOT_AUTHENTICATED: &str = "Not authenticated";

/// The resolved principal plus the exact token it was resolved from
///
/// Handlers extract it with `Extension<AuthenticatedUser>`. Logout needs
/// the raw token to blacklist it.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

/// Pull the credentials out of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(NOT_AUTHENTICATED.to_string()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AppError::Unauthorized(NOT_AUTHENTICATED.to_string())),
    }
}

/// Authentication middleware that requires a valid access token
///
/// This middleware:
/// 1. Extracts the bearer token
/// 2. Resolves it into the current user (decode, scope, blacklist, cache)
/// 3. Rejects inactive accounts
/// 4. Adds `AuthenticatedUser` to request extensions
///
/// ```ignore
/// let protected = Router::new()
///     .route("/users/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = match bearer_token(request.headers()) {
        Ok(token) => token.to_string(),
        Err(e) => {
            audit_invalid_token(request.headers(), e.detail());
            return Err(e);
        }
    };

    let user = match state.auth.resolve_current_user(&token).await {
        Ok(user) => user,
        Err(e) => {
            if matches!(e, AppError::Unauthorized(_)) {
                audit_invalid_token(request.headers(), e.detail());
            }
            return Err(e);
        }
    };

    state.auth.require_active(&user)?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user, token });

    Ok(next.run(request).await)
}

fn audit_invalid_token(headers: &HeaderMap, reason: &str) {
    audit_log(&AuditEvent::InvalidToken {
        reason: reason.to_string(),
        ip_address: extract_ip_address(headers),
        user_agent: extract_user_agent(headers),
    });
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must run inside `auth_middleware`:
///
/// ```ignore
/// let moderated = Router::new()
///     .route("/users/:id/active", patch(set_active_handler))
///     .route_layer(middleware::from_fn(require_role(UserRole::Moderator)))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub fn require_role(
    required: UserRole,
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    let policy = AccessPolicy::new(required);

    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let auth = request
                .extensions()
                .get::<AuthenticatedUser>()
                .ok_or_else(|| AppError::Unauthorized(NOT_AUTHENTICATED.to_string()))?;

            if let Err(e) = policy.check(&auth.user) {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: auth.user.id,
                    email: auth.user.email.clone(),
                    role: auth.user.role.to_string(),
                    required_role: policy.required().to_string(),
                    ip_address: extract_ip_address(request.headers()),
                    user_agent: extract_user_agent(request.headers()),
                });
                return Err(e);
            }

            Ok(next.run(request).await)
        })
    }
}
