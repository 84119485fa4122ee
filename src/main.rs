use std::sync::Arc;

use ai_meme_generator::config::AppConfig;
use ai_meme_generator::{api, AppState};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("creating upload directory {}", config.upload_dir.display()))?;

    info!(
        hf_token_set = config.api_token.is_some(),
        upload_dir = %config.upload_dir.display(),
        "starting meme generator backend"
    );

    let port = config.port;
    let state = Arc::new(AppState::new(config));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;

    info!("🚀 server running on http://localhost:{port}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
