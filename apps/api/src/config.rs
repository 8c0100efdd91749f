use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::embedding::DEFAULT_VOYAGE_BASE_URL;
use crate::ingest::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::llm_client::DEFAULT_GEMINI_BASE_URL;

pub const DEFAULT_VOYAGE_MODEL: &str = "voyage-3.5";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_LLAMA_PARSE_BASE_URL: &str = "https://api.cloud.llamaindex.ai";

/// Application configuration loaded from environment variables.
/// Fails at startup if a required credential is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub voyage_api_key: String,
    pub gemini_api_key: String,
    /// Only needed when the index has to be built, so it is not checked at startup.
    pub llama_parse_api_key: Option<String>,
    pub llama_parse_base_url: String,
    pub voyage_base_url: String,
    pub gemini_base_url: String,
    pub voyage_model: String,
    pub gemini_model: String,
    pub resume_path: PathBuf,
    pub storage_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // .env beside the crate first, then the working directory; both optional
        dotenvy::from_path(crate_dir().join(".env")).ok();
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        Ok(Config {
            voyage_api_key: require("VOYAGE_API_KEY")?,
            gemini_api_key: require("GEMINI_API_KEY")?,
            llama_parse_api_key: lookup("LLAMA_PARSE_API_KEY").filter(|v| !v.trim().is_empty()),
            llama_parse_base_url: lookup("LLAMA_PARSE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLAMA_PARSE_BASE_URL.to_string()),
            voyage_base_url: lookup("VOYAGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_VOYAGE_BASE_URL.to_string()),
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            voyage_model: lookup("VOYAGE_MODEL").unwrap_or_else(|| DEFAULT_VOYAGE_MODEL.to_string()),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            resume_path: resolve_path(lookup("RESUME_PATH"), "resume.pdf"),
            storage_dir: resolve_path(lookup("STORAGE_DIR"), "storage"),
            chunk_size: parse_or(lookup("CHUNK_SIZE"), DEFAULT_CHUNK_SIZE)
                .ok()
                .filter(|&size| size > 0)
                .context("CHUNK_SIZE must be a positive integer")?,
            chunk_overlap: parse_or(lookup("CHUNK_OVERLAP"), DEFAULT_CHUNK_OVERLAP)
                .context("CHUNK_OVERLAP must be a non-negative integer")?,
            port: lookup("PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Directory holding this crate's manifest. Relative paths resolve against it so the
/// service finds its document and index regardless of the working directory.
fn crate_dir() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
}

fn parse_or(value: Option<String>, default: usize) -> Result<usize, std::num::ParseIntError> {
    value.map(|v| v.trim().parse()).unwrap_or(Ok(default))
}

fn resolve_path(value: Option<String>, default: &str) -> PathBuf {
    let path = value.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(default));
    if path.is_absolute() {
        path
    } else {
        crate_dir().join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_voyage_key_fails_fast() {
        let err = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "g")])).unwrap_err();
        assert!(err.to_string().contains("VOYAGE_API_KEY"));
    }

    #[test]
    fn test_missing_gemini_key_fails_fast() {
        let err = Config::from_lookup(lookup_from(&[("VOYAGE_API_KEY", "v")])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let result = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "  "),
            ("GEMINI_API_KEY", "g"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_llama_parse_key_is_optional() {
        let config = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "v"),
            ("GEMINI_API_KEY", "g"),
        ]))
        .unwrap();
        assert!(config.llama_parse_api_key.is_none());
        assert_eq!(config.voyage_model, DEFAULT_VOYAGE_MODEL);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.port, 8000);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
    }

    #[test]
    fn test_relative_paths_resolve_against_crate_dir() {
        let config = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "v"),
            ("GEMINI_API_KEY", "g"),
            ("STORAGE_DIR", "data/index"),
            ("RESUME_PATH", "/srv/cv.pdf"),
        ]))
        .unwrap();
        assert_eq!(config.storage_dir, crate_dir().join("data/index"));
        assert_eq!(config.resume_path, PathBuf::from("/srv/cv.pdf"));
    }

    #[test]
    fn test_chunk_settings_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "v"),
            ("GEMINI_API_KEY", "g"),
            ("CHUNK_SIZE", "512"),
            ("CHUNK_OVERLAP", "64"),
        ]))
        .unwrap();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 64);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "v"),
            ("GEMINI_API_KEY", "g"),
            ("CHUNK_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }

    #[test]
    fn test_zero_chunk_overlap_is_allowed() {
        let config = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "v"),
            ("GEMINI_API_KEY", "g"),
            ("CHUNK_OVERLAP", "0"),
        ]))
        .unwrap();
        assert_eq!(config.chunk_overlap, 0);
    }

    #[test]
    fn test_upstream_base_urls_default_to_hosted_apis() {
        let config = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "v"),
            ("GEMINI_API_KEY", "g"),
            ("GEMINI_BASE_URL", "http://127.0.0.1:9000/v1beta"),
        ]))
        .unwrap();
        assert_eq!(config.voyage_base_url, DEFAULT_VOYAGE_BASE_URL);
        assert_eq!(config.gemini_base_url, "http://127.0.0.1:9000/v1beta");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("VOYAGE_API_KEY", "v"),
            ("GEMINI_API_KEY", "g"),
            ("PORT", "eighty"),
        ]));
        assert!(result.is_err());
    }
}
