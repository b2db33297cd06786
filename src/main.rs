use std::env;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info};

mod config;
mod handlers;
mod llm;
mod mask;
mod persona;
mod prompts;
mod session;
mod state;
mod utils;

use config::Config;
use llm::ImagenClient;
use state::AppState;
use utils::http::build_http_client;
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _guards = init_logging(&log_level, &log_dir);

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {err:#}");
            return Err(err);
        }
    };

    let http = build_http_client(config.request_timeout())
        .context("Failed to build HTTP client")?;
    let service = ImagenClient::new(http, &config);
    info!(
        "Starting influencer studio (model={}, bind={})",
        service.model(),
        config.bind_addr
    );

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, service);
    let app = handlers::routes::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!("Open http://{} in your browser", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Influencer studio stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}
