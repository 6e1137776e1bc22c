use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use marquee_api::api::{create_router, AppState};
use marquee_api::db::MemoryStore;
use marquee_api::services::generation::OllamaClient;
use marquee_api::services::providers::TmdbProvider;
use marquee_api::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(MemoryStore::new());
    let metadata = Arc::new(TmdbProvider::new(
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        std::time::Duration::from_secs(config.tmdb_timeout_secs),
    ));
    let generator = Arc::new(OllamaClient::new(
        config.ollama_url.clone(),
        config.ollama_model.clone(),
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(store, metadata, generator, config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
