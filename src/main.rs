//! Facial Emotion Recognition Service
//!
//! Serves an emotion classifier over REST. Faces are located with a
//! cascade detector and scored by an OpenVINO model.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fer_serve::config::Config;
use fer_serve::engine::{load_locator, OpenVinoLoader};
use fer_serve::service::{Context, Dispatcher};
use fer_serve::api::rest::{AppState, create_rest_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting FER Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Model: {} ({})", config.model.name, config.model.dir.display());
    info!("  Device: {}", config.model.device);
    info!("  Detector: {:?}", config.detector.backend);
    info!("  Pixel range: {:?}", config.preprocess.pixel_range);

    // Face detector is shared by every request
    let locator = load_locator(&config.detector)?;

    // Model loads lazily on the first request
    let dispatcher = Arc::new(Dispatcher::new(
        locator,
        Arc::new(OpenVinoLoader),
        config.preprocess.pixel_range,
    ));

    let app_state = Arc::new(AppState {
        dispatcher,
        context: Context::from_config(&config.model),
        start_time: Instant::now(),
    });

    let router = create_rest_router(app_state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);
    info!("Predict: http://localhost:{}/predictions/{}", config.server.port, config.model.name);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    info!("Goodbye!");
    Ok(())
}
