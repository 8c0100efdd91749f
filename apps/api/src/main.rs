mod chat;
mod config;
mod embedding;
mod errors;
mod index;
mod ingest;
mod llm_client;
mod routes;
mod state;
mod upstream;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::embedding::VoyageEmbedder;
use crate::index::IndexStore;
use crate::ingest::chunker::TextChunker;
use crate::ingest::llama_parse::LlamaParseClient;
use crate::llm_client::GeminiClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required credentials)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume chat API v{}", env!("CARGO_PKG_VERSION"));

    let embedder = Arc::new(VoyageEmbedder::new(
        &config.voyage_base_url,
        config.voyage_api_key.clone(),
        config.voyage_model.clone(),
    )?);
    info!("Embedding client initialized (model: {})", config.voyage_model);

    let llm = Arc::new(GeminiClient::new(
        &config.gemini_base_url,
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    )?);
    info!("LLM client initialized (model: {})", config.gemini_model);

    let parser = Arc::new(LlamaParseClient::new(
        config.llama_parse_base_url.clone(),
        config.llama_parse_api_key.clone(),
    )?);

    // The index is built or loaded lazily on the first question
    let index_store = Arc::new(IndexStore::new(
        config.resume_path.clone(),
        config.storage_dir.clone(),
        parser,
        embedder.clone(),
    )
    .with_chunker(TextChunker::new(config.chunk_size, config.chunk_overlap)));
    info!(
        "Index store: source {}, storage {}",
        config.resume_path.display(),
        index_store.storage_dir().display()
    );

    let state = AppState {
        index_store,
        embedder,
        llm,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
