use std::sync::Arc;

use pipeline::services::HttpExtractor;
use server::config::ServerConfig;
use server::state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let knowledge = db::KnowledgeRepository::new(pool.clone());
    let seeded = knowledge.seed_defaults().await?;
    if seeded > 0 {
        tracing::info!(count = seeded, "seeded knowledge base");
    }

    let mut state = AppState::new(pool, config.llm.clone(), config.pipeline.clone());
    if let Some(url) = &config.extractor_url {
        state = state.with_extractor(Arc::new(HttpExtractor::new(url)));
    }

    let app = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
