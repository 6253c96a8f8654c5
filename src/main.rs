use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use ask_philosopher::api;
use ask_philosopher::config::Config;
use ask_philosopher::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Corpus: {}", config.corpus_path.display());
    tracing::info!("Rules: {}", config.rules_path.display());
    tracing::info!(
        "Embeddings: {} ({} via {})",
        config.embeddings_path.display(),
        config.embedding.model,
        config.embedding.provider
    );

    // Corpus, rules and embeddings must all be ready before serving.
    let state = AppState::new(config.clone()).await?;

    let app = Router::new()
        .route("/api/providers", get(api::providers::list_providers))
        .route("/api/search", post(api::search::search))
        .route("/api/deduce", post(api::deduce::deduce))
        .route("/api/ask", post(api::ask::ask))
        .route("/api/reload", post(api::reload::reload))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
