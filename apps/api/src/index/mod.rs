//! Flat vector index over the resume's chunks.
//!
//! The index is small (a resume yields a handful of chunks) so retrieval is an
//! exhaustive cosine-similarity scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::embedding::EmbeddingModel;
use crate::errors::AppError;
use crate::ingest::chunker::TextChunker;
use crate::ingest::Document;

pub mod persist;
pub mod store;

pub use store::IndexStore;

/// Bumped whenever the on-disk layout changes; older directories fail to load.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embed_model: String,
    pub dimensions: usize,
    pub node_count: usize,
    pub created_at: DateTime<Utc>,
    pub source_file: String,
    /// SHA-256 of the source document bytes at build time.
    pub source_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedNode {
    pub id: Uuid,
    pub text: String,
    pub page: Option<u32>,
    pub embedding: Vec<f32>,
}

/// A node returned by `search`, with its similarity to the query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredNode<'a> {
    pub node: &'a IndexedNode,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    pub manifest: IndexManifest,
    pub nodes: Vec<IndexedNode>,
}

impl VectorIndex {
    /// Chunks and embeds `documents` into a new in-memory index.
    pub async fn build(
        documents: &[Document],
        chunker: &TextChunker,
        embedder: &dyn EmbeddingModel,
        source_file: String,
        source_sha256: Option<String>,
    ) -> Result<Self, AppError> {
        let chunks = chunker.chunk_documents(documents);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            embedder
                .embed_documents(&texts)
                .await
                .map_err(AppError::Embedding)?
        };

        if embeddings.len() != chunks.len() {
            return Err(AppError::Storage(format!(
                "embedding count {} does not match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        let nodes: Vec<IndexedNode> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedNode {
                id: Uuid::new_v4(),
                text: chunk.text,
                page: chunk.page,
                embedding,
            })
            .collect();

        info!(
            "Built index: {} document(s) -> {} node(s), {} dimensions",
            documents.len(),
            nodes.len(),
            dimensions
        );

        let index = VectorIndex {
            manifest: IndexManifest {
                format_version: FORMAT_VERSION,
                embed_model: embedder.model_name().to_string(),
                dimensions,
                node_count: nodes.len(),
                created_at: Utc::now(),
                source_file,
                source_sha256,
            },
            nodes,
        };
        index.validate()?;
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks the manifest against the nodes. A mismatch means a corrupt or foreign
    /// directory.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.manifest.format_version != FORMAT_VERSION {
            return Err(AppError::Storage(format!(
                "unsupported index format version {} (expected {FORMAT_VERSION})",
                self.manifest.format_version
            )));
        }
        if self.manifest.node_count != self.nodes.len() {
            return Err(AppError::Storage(format!(
                "manifest lists {} nodes but {} were stored",
                self.manifest.node_count,
                self.nodes.len()
            )));
        }
        if let Some(node) = self
            .nodes
            .iter()
            .find(|n| n.embedding.len() != self.manifest.dimensions)
        {
            return Err(AppError::Storage(format!(
                "node {} has {} dimensions, expected {}",
                node.id,
                node.embedding.len(),
                self.manifest.dimensions
            )));
        }
        Ok(())
    }

    /// Returns up to `top_k` nodes ordered by descending cosine similarity. Nodes
    /// with an undefined similarity (zero vector, dimension mismatch) are skipped.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<ScoredNode<'_>> {
        let mut scored: Vec<ScoredNode<'_>> = self
            .nodes
            .iter()
            .filter_map(|node| {
                cosine_similarity(query, &node.embedding).map(|score| ScoredNode { node, score })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        None
    } else {
        Some(dot / denom)
    }
}
