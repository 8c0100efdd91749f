//! Retrieval-augmented answering over a built index.

use tracing::debug;

use crate::embedding::EmbeddingModel;
use crate::errors::AppError;
use crate::index::VectorIndex;
use crate::llm_client::prompts::build_qa_prompt;
use crate::llm_client::LanguageModel;

/// Number of chunks retrieved per question.
pub const SIMILARITY_TOP_K: usize = 5;

/// Embeds `question`, retrieves the `top_k` closest chunks, and asks the language
/// model to answer from them. Nothing is cached between calls.
pub async fn query(
    index: &VectorIndex,
    question: &str,
    embedder: &dyn EmbeddingModel,
    llm: &dyn LanguageModel,
    top_k: usize,
) -> Result<String, AppError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("question cannot be empty".to_string()));
    }

    let query_vector = embedder
        .embed_query(question)
        .await
        .map_err(AppError::Embedding)?;

    let hits = index.search(&query_vector, top_k);
    debug!(
        "Retrieved {} of {} node(s); scores: {:?}",
        hits.len(),
        index.len(),
        hits.iter().map(|h| h.score).collect::<Vec<_>>()
    );

    let context: Vec<&str> = hits.iter().map(|h| h.node.text.as_str()).collect();
    let prompt = build_qa_prompt(&context, question);

    let answer = llm.complete(&prompt).await.map_err(AppError::Llm)?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(AppError::Llm(crate::upstream::UpstreamError::EmptyContent));
    }
    Ok(answer.to_string())
}
