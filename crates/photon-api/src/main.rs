//! Photon API Server

use photon_api::{create_router, state::AppState};
use photon_core::AppConfig;
use std::net::SocketAddr;
use std::sync::Arc;

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("PHOTON_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let level = &config.logging.level;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("photon_api={level},tower_http={level},audit=info").into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    // Fail readiness while in-flight requests drain
    state.set_ready(false);
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = load_config()?;
    init_tracing(&config);

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::from_config(config).await?);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Photon API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    // Peer address is the rate limiter's fallback client key
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state))
    .await?;

    Ok(())
}
