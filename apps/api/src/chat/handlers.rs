//! Axum route handlers for the Chat API.

use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::chat::query_engine::{query, SIMILARITY_TOP_K};
use crate::errors::AppError;
use crate::state::AppState;

pub const NO_QUESTION_ANSWER: &str = "No question provided.";

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

/// POST /chat
///
/// The body is read as JSON whatever its Content-Type. A missing, null, non-string or
/// blank question is answered with a fixed message rather than an error status.
/// Otherwise the index is fetched (built on first use) and the question is answered
/// from the top retrieved chunks.
pub async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, AppError> {
    let request: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Request body is not valid JSON: {e}")))?;

    let Some(question) = question_of(&request) else {
        return Ok(Json(ChatResponse {
            answer: NO_QUESTION_ANSWER.to_string(),
        }));
    };

    let index = state.index_store.get_index().await?;
    let answer = query(
        &index,
        question,
        state.embedder.as_ref(),
        state.llm.as_ref(),
        SIMILARITY_TOP_K,
    )
    .await?;

    info!(
        "Answered question ({} chars) with {} chars",
        question.len(),
        answer.len()
    );
    Ok(Json(ChatResponse { answer }))
}

/// The trimmed `question` field, if the body is an object holding a non-blank string.
fn question_of(request: &Value) -> Option<&str> {
    request
        .get("question")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
}
