//! On-disk layout of a persisted index: `manifest.json` and `nodes.json` inside the
//! storage directory.
//!
//! Saving stages both files in a sibling temporary directory and renames it into
//! place, so the storage directory either holds a complete index or does not exist.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::index::{IndexManifest, IndexedNode, VectorIndex};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const NODES_FILE: &str = "nodes.json";
const STAGING_PREFIX: &str = ".index-staging-";

pub async fn exists(dir: &Path) -> Result<bool, AppError> {
    tokio::fs::try_exists(dir)
        .await
        .map_err(|e| AppError::storage(&format!("cannot stat {}", dir.display()), e))
}

/// Writes `index` to `dir`. Fails if `dir` already exists.
pub async fn save(index: &VectorIndex, dir: &Path) -> Result<(), AppError> {
    let parent = parent_of(dir);
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| AppError::storage(&format!("cannot create {}", parent.display()), e))?;

    // Dropped on any early return, which removes the partial files
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&parent)
        .map_err(|e| AppError::storage("cannot create staging directory", e))?;

    write_json(&staging.path().join(NODES_FILE), &index.nodes).await?;
    write_json(&staging.path().join(MANIFEST_FILE), &index.manifest).await?;

    tokio::fs::rename(staging.path(), dir).await.map_err(|e| {
        AppError::storage(&format!("cannot move index into {}", dir.display()), e)
    })?;

    info!(
        "Persisted index ({} nodes) to {}",
        index.manifest.node_count,
        dir.display()
    );
    Ok(())
}

/// Reads and validates the index stored in `dir`.
pub async fn load(dir: &Path) -> Result<VectorIndex, AppError> {
    let manifest: IndexManifest = read_json(&dir.join(MANIFEST_FILE)).await?;
    let nodes: Vec<IndexedNode> = read_json(&dir.join(NODES_FILE)).await?;

    let index = VectorIndex { manifest, nodes };
    index.validate()?;

    debug!("Loaded index with {} nodes from {}", index.len(), dir.display());
    Ok(index)
}

fn parent_of(dir: &Path) -> PathBuf {
    match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::storage(&format!("cannot encode {}", path.display()), e))?;
    let write_err =
        |e: std::io::Error| AppError::storage(&format!("cannot write {}", path.display()), e);

    let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
    file.write_all(&bytes).await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::storage(&format!("cannot read {}", path.display()), e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::storage(&format!("cannot decode {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FORMAT_VERSION;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_index() -> VectorIndex {
        VectorIndex {
            manifest: IndexManifest {
                format_version: FORMAT_VERSION,
                embed_model: "voyage-3.5".into(),
                dimensions: 3,
                node_count: 1,
                created_at: Utc::now(),
                source_file: "cv.pdf".into(),
                source_sha256: Some("deadbeef".into()),
            },
            nodes: vec![IndexedNode {
                id: Uuid::new_v4(),
                text: "Principal Engineer, Globex".into(),
                page: Some(1),
                embedding: vec![0.5, -0.25, 1.0],
            }],
        }
    }

    #[tokio::test]
    async fn test_save_then_load_restores_index() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("storage");
        let index = sample_index();

        save(&index, &dir).await.unwrap();
        assert!(exists(&dir).await.unwrap());

        let loaded = load(&dir).await.unwrap();
        assert_eq!(loaded, index);
    }

    #[tokio::test]
    async fn test_save_leaves_no_staging_directories() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("storage");
        save(&sample_index(), &dir).await.unwrap();

        let mut entries = std::fs::read_dir(root.path()).unwrap();
        let only = entries.next().unwrap().unwrap();
        assert_eq!(only.file_name(), "storage");
        assert!(entries.next().is_none());
    }

    #[tokio::test]
    async fn test_save_refuses_to_overwrite_existing_index() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("storage");
        save(&sample_index(), &dir).await.unwrap();

        let err = save(&sample_index(), &dir).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(load(&dir).await.is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_directory_fails() {
        let root = tempfile::tempdir().unwrap();
        let err = load(&root.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_truncated_nodes_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("storage");
        save(&sample_index(), &dir).await.unwrap();
        std::fs::write(dir.join(NODES_FILE), "[").unwrap();

        assert!(matches!(load(&dir).await, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_load_rejects_missing_manifest() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("storage");
        save(&sample_index(), &dir).await.unwrap();
        std::fs::remove_file(dir.join(MANIFEST_FILE)).unwrap();

        assert!(matches!(load(&dir).await, Err(AppError::Storage(_))));
    }
}
