//! Document ingestion: turning the source file into parsed segments and then into
//! retrieval-sized chunks.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::upstream::UpstreamError;

pub mod chunker;
pub mod llama_parse;

/// One parsed segment of the source document (a page, for LlamaParse).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub file_name: String,
    /// 1-based page number within the source file.
    pub page: Option<u32>,
}

/// Converts a file on disk into parsed document segments.
///
/// Carried in `IndexStore` as `Arc<dyn DocumentParser>` so tests can swap in a fake.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Vec<Document>, UpstreamError>;
}

/// Display name used in document metadata.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
