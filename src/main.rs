mod config;
mod engine;
mod error;
mod executor;
mod models;
mod normalize;
mod planner;
mod platform;
mod rank;
mod routes;
mod strategy;

use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::{AppConfig, build_cors_layer},
    engine::YtDlp,
    error::ApiError,
    routes::AppState,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "media_resolver=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = Arc::new(AppConfig::from_env().await?);
    let engine = YtDlp::new(config.ytdlp_path.clone());
    info!(
        "Using media engine {:?}, downloads staged under {:?}",
        config.ytdlp_path, config.download_dir
    );

    let cors = build_cors_layer(&config.allowed_origins)?;
    let state = AppState {
        config: Arc::clone(&config),
        engine: Arc::new(engine),
    };

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr.clone();
    let listener = TcpListener::bind(&addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {addr}: {error}"))
    })?;

    info!("Media resolver listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
