//! Photon API - authentication and session core for the photo-sharing service
//!
//! Issues and verifies scoped tokens, keeps the revocation list and the
//! cached principal in a key-value store, and exposes the auth and user
//! administration endpoints over HTTP.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Photon API",
        description = "Authentication and session endpoints for the Photon photo-sharing service"
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::signup_handler,
        handlers::auth::login_handler,
        handlers::auth::logout_handler,
        handlers::auth::refresh_token_handler,
        handlers::auth::confirmed_email_handler,
        handlers::auth::request_reset_handler,
        handlers::auth::reset_form_handler,
        handlers::auth::reset_password_handler,
        handlers::users::me_handler,
        handlers::users::change_password_handler,
        handlers::users::set_active_handler,
        handlers::users::change_role_handler,
    ),
    components(schemas(
        auth::SignupRequest,
        auth::SignupResponse,
        auth::LoginForm,
        auth::TokenResponse,
        auth::EmailRequest,
        auth::TimeoutLink,
        auth::ResetPasswordResponse,
        auth::NewPasswordForm,
        auth::MessageResponse,
        auth::StatusResponse,
        auth::AssignableRole,
        auth::ChangePasswordRequest,
        auth::ChangeRoleRequest,
        auth::SetActiveRequest,
        photon_core::UserPublic,
        photon_core::UserRole,
        error::ApiError,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::health::ReadinessChecks,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "auth", description = "Signup, login, token rotation, email flows"),
        (name = "users", description = "Profile and moderation"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
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

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    // No configured origins: no Access-Control-Allow-Origin is ever sent,
    // so browsers keep to same-origin requests
    if origins.is_empty() {
        return layer;
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = routes::api_routes(state.clone()).layer(axum::middleware::from_fn(
        middleware::security_headers_middleware,
    ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .nest("/api", api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.server.cors_origins))
        .with_state(state)
}

/// In-memory wiring for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use crate::auth::{
        AuthService, AuthSettings, InMemoryRevocationStore, InMemoryUserRepository,
        PasswordConfig, PasswordHasher, RevocationStore, TokenCodec,
    };
    use crate::mail::MemoryMailer;
    use crate::state::AppState;
    use axum::Router;
    use photon_core::{AppConfig, SigningAlgorithm};
    use std::sync::Arc;
    use std::time::Duration;

    pub const TEST_SECRET: &str = "photon-test-secret";

    /// Router plus handles on the collaborators behind it
    pub struct TestApp {
        pub router: Router,
        pub state: Arc<AppState>,
        pub users: Arc<InMemoryUserRepository>,
        pub mailer: Arc<MemoryMailer>,
    }

    impl TestApp {
        /// In-memory wiring with rate limiting off
        pub fn new() -> Self {
            Self::with_store(Arc::new(InMemoryRevocationStore::default()))
        }

        /// Same wiring with a caller-supplied revocation store
        pub fn with_store(store: Arc<dyn RevocationStore>) -> Self {
            Self::build(store, test_config(false))
        }

        /// Same wiring with the default per-IP rate limits in force
        pub fn with_rate_limits() -> Self {
            Self::build(
                Arc::new(InMemoryRevocationStore::default()),
                test_config(true),
            )
        }

        fn build(store: Arc<dyn RevocationStore>, config: AppConfig) -> Self {
            let users = Arc::new(InMemoryUserRepository::new());
            let mailer = Arc::new(MemoryMailer::default());

            // Light Argon2 cost keeps the suite fast
            let hasher = PasswordHasher::new(&PasswordConfig {
                memory_cost: 8192,
                time_cost: 1,
                parallelism: 1,
            })
            .expect("valid test hashing parameters");

            let settings = AuthSettings {
                io_timeout: Duration::from_millis(200),
                ..AuthSettings::from_config(&config.auth, &config.cache)
            };

            let auth = AuthService::new(
                TokenCodec::new(TEST_SECRET.as_bytes(), SigningAlgorithm::HS256),
                hasher,
                store,
                users.clone(),
                mailer.clone(),
                settings,
            );

            let state = Arc::new(AppState::new(config, auth));
            let router = crate::create_router(state.clone());

            Self {
                router,
                state,
                users,
                mailer,
            }
        }
    }

    fn test_config(rate_limits: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.secret_key = TEST_SECRET.to_string();
        config.server.public_base_url = "http://photon.test/".to_string();
        config.rate_limit.enabled = rate_limits;
        config
    }

    impl Default for TestApp {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Router over fresh in-memory collaborators
    pub fn create_router_for_testing() -> Router {
        TestApp::new().router
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use testing::create_router_for_testing;
