//! API route definitions

use crate::auth::{auth_middleware, require_role};
use crate::handlers::{auth, users};
use crate::middleware::{rate_limited, LimitedRoute};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use photon_core::UserRole;
use std::sync::Arc;

/// Routes mounted under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let limits = &state.config.rate_limit;
    let authenticate = middleware::from_fn_with_state(state.clone(), auth_middleware);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        // Carries a refresh token, checked by the handler itself
        .route("/auth/refresh_token", get(auth::refresh_token_handler))
        .route("/auth/confirmed_email/:token", get(auth::confirmed_email_handler));

    let login_routes = rate_limited(
        Router::new().route("/auth/login", post(auth::login_handler)),
        LimitedRoute::Login,
        limits,
    );

    let reset_routes = rate_limited(
        Router::new()
            .route("/auth/reset_password", post(auth::request_reset_handler))
            .route(
                "/auth/reset_password/:token",
                get(auth::reset_form_handler).post(auth::reset_password_handler),
            ),
        LimitedRoute::PasswordReset,
        limits,
    );

    // Any active user
    let user_routes = Router::new()
        .route("/auth/logout", get(auth::logout_handler))
        .route("/users/me", get(users::me_handler))
        .route_layer(authenticate.clone());

    let password_routes = rate_limited(
        Router::new()
            .route("/users/password", patch(users::change_password_handler))
            .route_layer(authenticate.clone()),
        LimitedRoute::PasswordChange,
        limits,
    );

    let admin_routes = Router::new()
        .route("/users/:id/active", patch(users::set_active_handler))
        .route("/users/:id/role", patch(users::change_role_handler))
        .route_layer(middleware::from_fn(require_role(UserRole::Admin)))
        .route_layer(authenticate);

    Router::new()
        .merge(public_routes)
        .merge(login_routes)
        .merge(reset_routes)
        .merge(user_routes)
        .merge(password_routes)
        .merge(admin_routes)
}
