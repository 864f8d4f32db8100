//! livewatch - Live detection event pipeline
//!
//! Main entry point for the dashboard backend.

use livewatch::{
    state::{load_static_feeds, AppConfig, AppState},
    web_api,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livewatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting livewatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        transport = ?config.transport_mode,
        detection_url = %config.detection_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        max_active_feeds = config.max_active_feeds,
        "Configuration loaded"
    );

    let state = AppState::new(config.clone())?;

    // Static feeds
    let feeds = match &config.feeds_file {
        Some(path) => match load_static_feeds(path) {
            Ok(feeds) => {
                tracing::info!(path = %path.display(), count = feeds.len(), "Static feeds loaded");
                feeds
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to load static feeds");
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    state.initialize(feeds).await;

    if config.auto_connect {
        let connection = state.connection.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.connect().await {
                tracing::warn!(error = %e, "Initial connection to detection service failed");
            }
        });
    }

    // Build router
    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.connection.disconnect().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
