//! Core domain types shared across the ingestion pipeline.
//!
//! Everything that crosses a boundary — the queue message, the crawl status
//! records, the vector payloads — is declared here with an explicit serde
//! schema so provider responses are validated once, at the edge, instead of
//! being probed ad hoc deeper in the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the ingestion pipeline.
///
/// Each variant corresponds to one external boundary. Client modules retry
/// transient provider faults internally; by the time an `IngestError`
/// surfaces, the failure is terminal for the current attempt and the whole
/// job is marked `FAILED` with the rendered message.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The crawl provider rejected the start request or returned no job id.
    #[error("crawl start failed: {0}")]
    CrawlStart(String),

    /// The crawl job itself reached the provider-side `failed` state.
    #[error("crawl failed: {0}")]
    CrawlFailed(String),

    /// Transport or protocol error while talking to the crawl provider.
    #[error("crawl provider error: {0}")]
    Crawl(String),

    /// Embedding call failed after exhausting local retries, or returned a
    /// malformed / wrongly-sized vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector store upsert or query failed.
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Durable queue operation failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// Crawl/project status record could not be read or written.
    #[error("status store error: {0}")]
    Status(String),

    /// Invalid settings or seed input (bad URL, zero chunk size, ...).
    #[error("invalid input: {0}")]
    Invalid(String),
}

/// Queue message produced by the API layer and consumed by the worker.
///
/// Immutable once enqueued; `namespace` is the project's isolation key into
/// the shared vector index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub crawl_id: String,
    pub project_id: String,
    pub website_url: String,
    pub namespace: String,
}

/// Lifecycle of one crawl record.
///
/// Strictly advances `Pending → Processing → {Completed | Failed}`; the
/// worker is the only writer past `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Pending => "PENDING",
            CrawlStatus::Processing => "PROCESSING",
            CrawlStatus::Completed => "COMPLETED",
            CrawlStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        match raw {
            "PENDING" => Ok(CrawlStatus::Pending),
            "PROCESSING" => Ok(CrawlStatus::Processing),
            "COMPLETED" => Ok(CrawlStatus::Completed),
            "FAILED" => Ok(CrawlStatus::Failed),
            other => Err(IngestError::Status(format!(
                "unknown crawl status '{other}'"
            ))),
        }
    }

    /// Terminal states admit no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlStatus::Completed | CrawlStatus::Failed)
    }
}

/// Project readiness, mirroring the most recent crawl's terminal outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Creating,
    Ready,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Creating => "CREATING",
            ProjectStatus::Ready => "READY",
            ProjectStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        match raw {
            "CREATING" => Ok(ProjectStatus::Creating),
            "READY" => Ok(ProjectStatus::Ready),
            "FAILED" => Ok(ProjectStatus::Failed),
            other => Err(IngestError::Status(format!(
                "unknown project status '{other}'"
            ))),
        }
    }
}

/// Persisted crawl record, read back by the dashboard.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRecord {
    pub id: String,
    pub project_id: String,
    pub status: CrawlStatus,
    pub pages_count: Option<u32>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Persisted project record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub status: ProjectStatus,
    pub namespace: String,
}

/// One crawled page, as normalized from the crawl provider.
///
/// Ephemeral: consumed immediately by the chunker, never persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub text_content: String,
}

/// Metadata stored alongside each vector in the index.
///
/// Key names follow the wire convention of the vector store so dashboard
/// queries can filter on them directly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub project_id: String,
    pub crawl_id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub chunk_index: usize,
}

/// Unit stored in the vector index.
///
/// `id` is deterministic over `(crawl_id, url, chunk_index)` (see
/// [`crate::chunker::stable_id`]) so re-upserting the same crawl overwrites
/// instead of duplicating entries.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// One similarity-search hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
