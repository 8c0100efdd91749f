//! Text embeddings via the Voyage AI API.
//!
//! Documents and queries are embedded with different `input_type`s. Voyage tunes the
//! vectors for asymmetric retrieval that way.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::upstream::{http_client, send_with_retry, RetryPolicy, UpstreamError};

pub const DEFAULT_VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
/// Texts per embeddings request.
const BATCH_SIZE: usize = 32;

/// Produces embedding vectors for document chunks and for questions.
///
/// Carried in `AppState` as `Arc<dyn EmbeddingModel>`.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embeds document chunks, one vector per input in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;

    /// Model identifier, recorded in the index manifest.
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum InputType {
    Document,
    Query,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: InputType,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Clone)]
pub struct VoyageEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl VoyageEmbedder {
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client()?,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
            retry: RetryPolicy::default(),
        })
    }

    async fn embed(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, UpstreamError> {
        let request_body = EmbeddingRequest {
            input: texts,
            model: &self.model,
            input_type,
        };

        let response = send_with_retry("Voyage", self.retry, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
        })
        .await?;

        let body: EmbeddingResponse = response.json().await?;
        if let Some(usage) = &body.usage {
            debug!(
                "Voyage embedded {} text(s): total_tokens={}",
                texts.len(),
                usage.total_tokens
            );
        }
        order_embeddings(body.data, texts.len())
    }
}

#[async_trait]
impl EmbeddingModel for VoyageEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            embeddings.extend(self.embed(batch, InputType::Document).await?);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let input = [text.to_string()];
        self.embed(&input, InputType::Query)
            .await?
            .pop()
            .ok_or(UpstreamError::EmptyContent)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Puts response items back in request order and checks one vector came back per input.
fn order_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, UpstreamError> {
    if data.len() != expected {
        return Err(UpstreamError::Invalid(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    if data.iter().any(|d| d.embedding.is_empty()) {
        return Err(UpstreamError::EmptyContent);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}
