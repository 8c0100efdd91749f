//! In-process fakes for the hosted services, used by unit tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingModel;
use crate::ingest::{file_name_of, Document, DocumentParser};
use crate::llm_client::LanguageModel;
use crate::upstream::UpstreamError;

/// Serves `router` on an ephemeral localhost port and returns its base URL.
pub async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn doc(text: &str, page: u32) -> Document {
    Document {
        text: text.to_string(),
        file_name: "resume.pdf".to_string(),
        page: Some(page),
    }
}

pub fn resume_pages() -> Vec<String> {
    vec![
        "Staff Engineer at Initech since 2021. Leads the platform team.".to_string(),
        "BSc Computer Science, State University, 2015.".to_string(),
        "Skills: Rust, Go, Kubernetes, PostgreSQL.".to_string(),
    ]
}

fn injected_failure(service: &str) -> UpstreamError {
    UpstreamError::Api {
        status: 503,
        message: format!("{service} unavailable (injected)"),
    }
}

/// Returns fixed pages and counts invocations.
pub struct FakeParser {
    pages: Vec<String>,
    calls: AtomicUsize,
    failure: Mutex<Option<UpstreamError>>,
}

impl FakeParser {
    pub fn resume() -> Self {
        Self {
            pages: resume_pages(),
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next_with(injected_failure("parser"));
    }

    pub fn fail_next_with(&self, err: UpstreamError) {
        *self.failure.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl DocumentParser for FakeParser {
    async fn load(&self, path: &Path) -> Result<Vec<Document>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;

        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(i, text)| Document {
                text: text.clone(),
                file_name: file_name_of(path),
                page: Some(i as u32 + 1),
            })
            .collect())
    }
}

const HASH_DIMENSIONS: usize = 256;

/// Deterministic bag-of-words embedder: each lowercase word bumps one hashed bucket.
#[derive(Default)]
pub struct HashEmbedder {
    document_calls: AtomicUsize,
    query_calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl HashEmbedder {
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASH_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % HASH_DIMENSIONS as u64) as usize] += 1.0;
        }
        // Keeps every vector non-zero so cosine similarity is always defined
        vector[0] += 0.01;
        vector
    }

    pub fn document_calls(&self) -> usize {
        self.document_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<(), UpstreamError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(injected_failure("embedder"));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.vector_for(text))
    }

    fn model_name(&self) -> &str {
        "hash-bow-256"
    }
}

/// Answers with a fixed sentence and remembers the last prompt it saw.
#[derive(Default)]
pub struct EchoLlm {
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    fail_next: AtomicBool,
}

impl EchoLlm {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LanguageModel for EchoLlm {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(injected_failure("llm"));
        }
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(format!(
            "According to the resume ({} characters of context), the answer is above.",
            prompt.len()
        ))
    }

    fn model(&self) -> &str {
        "echo"
    }
}
