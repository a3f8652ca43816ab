mod catalog;
mod codec;
mod config;
mod models;
mod routes;
mod tryon;
mod wizard;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use crate::catalog::Catalog;
use crate::codec::HttpImageFetcher;
use crate::config::Config;
use crate::routes::AppState;
use crate::tryon::GeminiTryOn;
use crate::wizard::Wizard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    match &config.api_key {
        Some(key) => tracing::info!(
            "Using API key: {}...",
            &key[..std::cmp::min(10, key.len())]
        ),
        None => tracing::warn!(
            "GEMINI_API_KEY not set; try-on requests will ask for activation"
        ),
    }

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let wizard = Wizard::new(
        Catalog::jubilee_collection(),
        Arc::new(HttpImageFetcher::new(http.clone())),
        Arc::new(GeminiTryOn::new(http, &config)),
        config.instruction.clone(),
    );
    let state = AppState {
        wizard: Arc::new(wizard),
        key_configured: config.api_key.is_some(),
    };

    let app = routes::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, model = %config.model, "Starting UMADEFIT try-on server");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}
