use std::sync::Arc;

use crate::embedding::EmbeddingModel;
use crate::index::IndexStore;
use crate::llm_client::LanguageModel;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Build-or-load access to the resume index; owns the document parser.
    pub index_store: Arc<IndexStore>,
    /// Embeds questions. The same model the index was built with.
    pub embedder: Arc<dyn EmbeddingModel>,
    pub llm: Arc<dyn LanguageModel>,
}
