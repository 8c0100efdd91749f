//! Build-or-load access to the document index.
//!
//! The store has two states keyed on the storage directory: Unbuilt (absent) and
//! Built (present). The first `get_index` call with the directory absent parses,
//! embeds and persists the document; later calls load it. Whatever was loaded or
//! built stays cached in memory until the directory disappears.
//!
//! The whole build-or-load path runs under one async mutex, so concurrent first
//! requests share a single build instead of racing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::embedding::EmbeddingModel;
use crate::errors::AppError;
use crate::index::{persist, VectorIndex};
use crate::ingest::chunker::TextChunker;
use crate::ingest::{file_name_of, DocumentParser};
use crate::upstream::UpstreamError;

pub struct IndexStore {
    source_path: PathBuf,
    storage_dir: PathBuf,
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn EmbeddingModel>,
    chunker: TextChunker,
    /// Cached index. Holding this lock is the build-in-flight permit.
    cached: Mutex<Option<Arc<VectorIndex>>>,
}

impl IndexStore {
    pub fn new(
        source_path: PathBuf,
        storage_dir: PathBuf,
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            source_path,
            storage_dir,
            parser,
            embedder,
            chunker: TextChunker::default(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// True once an index has been loaded or built in this process.
    pub fn is_ready(&self) -> bool {
        // A held lock means a build or load is in progress
        self.cached
            .try_lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    pub async fn get_index(&self) -> Result<Arc<VectorIndex>, AppError> {
        let mut cached = self.cached.lock().await;
        let on_disk = persist::exists(&self.storage_dir).await?;

        if let Some(index) = cached.as_ref() {
            if on_disk {
                return Ok(Arc::clone(index));
            }
            warn!(
                "Index directory {} disappeared; dropping cached index",
                self.storage_dir.display()
            );
            *cached = None;
        }

        let index = if on_disk {
            self.load().await?
        } else {
            self.build_and_persist().await?
        };

        let index = Arc::new(index);
        *cached = Some(Arc::clone(&index));
        Ok(index)
    }

    async fn load(&self) -> Result<VectorIndex, AppError> {
        info!("Loading index from {}", self.storage_dir.display());
        let index = persist::load(&self.storage_dir).await?;

        if index.manifest.embed_model != self.embedder.model_name() {
            warn!(
                "Index was embedded with '{}' but queries use '{}'",
                index.manifest.embed_model,
                self.embedder.model_name()
            );
        }

        if let (Some(stored), Some(current)) = (
            index.manifest.source_sha256.as_deref(),
            fingerprint(&self.source_path).await,
        ) {
            if stored != current {
                warn!(
                    "{} changed since the index was built at {}; serving the stale index. \
                     Delete {} to rebuild.",
                    self.source_path.display(),
                    index.manifest.created_at,
                    self.storage_dir.display()
                );
            }
        }

        Ok(index)
    }

    async fn build_and_persist(&self) -> Result<VectorIndex, AppError> {
        info!(
            "No index at {}; building from {}",
            self.storage_dir.display(),
            self.source_path.display()
        );

        let documents = self
            .parser
            .load(&self.source_path)
            .await
            .map_err(parse_error)?;
        let index = VectorIndex::build(
            &documents,
            &self.chunker,
            self.embedder.as_ref(),
            file_name_of(&self.source_path),
            fingerprint(&self.source_path).await,
        )
        .await?;
        if index.is_empty() {
            warn!(
                "{} produced no text; answers will have no context",
                self.source_path.display()
            );
        }

        persist::save(&index, &self.storage_dir).await?;
        Ok(index)
    }
}

fn parse_error(err: UpstreamError) -> AppError {
    match err {
        UpstreamError::MissingCredential(key) => {
            AppError::Configuration(format!("{key} is required to build the index"))
        }
        other => AppError::Parse(other),
    }
}

/// SHA-256 of the file's bytes, or `None` if it cannot be read.
async fn fingerprint(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    Some(hex::encode(Sha256::digest(&bytes)))
}
