//! LlamaParse client: uploads a file, polls the parsing job, and downloads the
//! markdown result split into one `Document` per page.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use tracing::{debug, info};

use crate::ingest::{file_name_of, Document, DocumentParser};
use crate::upstream::{ensure_success, http_client, UpstreamError};

/// Instruction sent with every upload.
pub const CONTENT_GUIDELINE: &str = "Extract the main points of the document";
const RESULT_TYPE: &str = "markdown";
/// LlamaParse joins pages of a markdown result with this separator.
const PAGE_SEPARATOR: &str = "\n---\n";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_WAIT: Duration = Duration::from_secs(2000);

pub struct LlamaParseClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    max_wait: Duration,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MarkdownResult {
    markdown: String,
}

#[derive(Debug, PartialEq)]
enum JobStatus {
    Pending,
    Success,
    Failed(String),
}

impl JobStatus {
    fn from_api(status: &str) -> Self {
        match status {
            "SUCCESS" => JobStatus::Success,
            "ERROR" | "CANCELED" | "CANCELLED" => JobStatus::Failed(status.to_string()),
            _ => JobStatus::Pending,
        }
    }
}

impl LlamaParseClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: POLL_INTERVAL,
            max_wait: MAX_WAIT,
        })
    }

    fn api_key(&self) -> Result<&str, UpstreamError> {
        self.api_key
            .as_deref()
            .ok_or(UpstreamError::MissingCredential("LLAMA_PARSE_API_KEY"))
    }

    async fn upload(&self, path: &Path) -> Result<String, UpstreamError> {
        let bytes = tokio::fs::read(path).await?;
        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name_of(path)))
            .text("result_type", RESULT_TYPE)
            .text("content_guideline_instruction", CONTENT_GUIDELINE);

        let response = self
            .client
            .post(format!("{}/api/parsing/upload", self.base_url))
            .bearer_auth(self.api_key()?)
            .multipart(form)
            .send()
            .await?;
        let upload: UploadResponse = ensure_success(response).await?.json().await?;
        Ok(upload.id)
    }

    async fn wait_for_job(&self, job_id: &str) -> Result<(), UpstreamError> {
        let started = Instant::now();
        loop {
            let response = self
                .client
                .get(format!("{}/api/parsing/job/{job_id}", self.base_url))
                .bearer_auth(self.api_key()?)
                .send()
                .await?;
            let job: JobResponse = ensure_success(response).await?.json().await?;

            match JobStatus::from_api(&job.status) {
                JobStatus::Success => return Ok(()),
                JobStatus::Failed(status) => {
                    return Err(UpstreamError::Invalid(format!(
                        "parsing job {job_id} finished with status {status}"
                    )))
                }
                JobStatus::Pending => {
                    if started.elapsed() >= self.max_wait {
                        return Err(UpstreamError::Timeout(self.max_wait));
                    }
                    debug!("Parsing job {job_id} still {}", job.status);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn fetch_markdown(&self, job_id: &str) -> Result<String, UpstreamError> {
        let response = self
            .client
            .get(format!(
                "{}/api/parsing/job/{job_id}/result/{RESULT_TYPE}",
                self.base_url
            ))
            .bearer_auth(self.api_key()?)
            .send()
            .await?;
        let result: MarkdownResult = ensure_success(response).await?.json().await?;
        Ok(result.markdown)
    }
}

#[async_trait]
impl DocumentParser for LlamaParseClient {
    async fn load(&self, path: &Path) -> Result<Vec<Document>, UpstreamError> {
        // Fail on a missing key before reading or uploading anything
        self.api_key()?;

        info!("Uploading {} to LlamaParse", path.display());
        let job_id = self.upload(path).await?;
        self.wait_for_job(&job_id).await?;
        let markdown = self.fetch_markdown(&job_id).await?;

        let documents = split_pages(&markdown, &file_name_of(path));
        info!(
            "LlamaParse job {job_id} returned {} page(s)",
            documents.len()
        );
        Ok(documents)
    }
}

/// Splits a markdown result into per-page documents, dropping blank pages but keeping
/// the original page numbering.
fn split_pages(markdown: &str, file_name: &str) -> Vec<Document> {
    markdown
        .split(PAGE_SEPARATOR)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Document {
            text: page.trim().to_string(),
            file_name: file_name.to_string(),
            page: Some(i as u32 + 1),
        })
        .collect()
}
