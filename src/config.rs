//! Worker settings and environment resolution.
//!
//! The library side is plain typed settings with validated invariants; the
//! binary resolves overrides from the environment (via `dotenvy`) and passes
//! the result into the worker's constructor. No global state.

use std::time::Duration;

use crate::types::IngestError;

/// Tunables for one ingestion worker.
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    /// Window size for the text chunker, in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, in characters. Must be `< chunk_size`.
    pub chunk_overlap: usize,
    /// Maximum pages requested per crawl job.
    pub page_limit: u32,
    /// Expected embedding dimensionality; any other length is a hard failure.
    pub embedding_dim: usize,
    /// Pause between consecutive embedding calls, to stay under provider
    /// rate limits. Zero disables pacing.
    pub embed_pacing: Duration,
    /// Maximum vectors per upsert call.
    pub upsert_batch_size: usize,
    /// Idle sleep between queue polls when no job is due.
    pub queue_poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            page_limit: 100,
            embedding_dim: 768,
            embed_pacing: Duration::from_millis(100),
            upsert_batch_size: 100,
            queue_poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerSettings {
    /// Validates the chunking invariants that guarantee termination.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::Invalid("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.upsert_batch_size == 0 {
            return Err(IngestError::Invalid(
                "upsert_batch_size must be positive".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_chunking(mut self, size: usize, overlap: usize) -> Self {
        self.chunk_size = size;
        self.chunk_overlap = overlap;
        self
    }

    #[must_use]
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    #[must_use]
    pub fn with_embed_pacing(mut self, pacing: Duration) -> Self {
        self.embed_pacing = pacing;
        self
    }
}

/// Process-level configuration for the worker binary.
///
/// All values come from the environment; `load` calls `dotenvy::dotenv()`
/// first so a local `.env` file works out of the box.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// SQLite URL for the queue and status records, e.g. `sqlite://crawldex.db`.
    pub database_url: String,
    /// Crawl provider base URL.
    pub crawler_url: String,
    pub crawler_api_key: String,
    /// Embedding provider base URL.
    pub embedding_url: String,
    pub embedding_api_key: String,
    /// Vector index base URL (one index, namespaced per project).
    pub vector_index_url: String,
    pub vector_api_key: String,
}

impl EnvConfig {
    pub fn load() -> Result<Self, IngestError> {
        dotenvy::dotenv().ok();
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://crawldex.db?mode=rwc".to_string()),
            crawler_url: require("CRAWLER_URL")?,
            crawler_api_key: require("CRAWLER_API_KEY")?,
            embedding_url: require("EMBEDDING_URL")?,
            embedding_api_key: require("EMBEDDING_API_KEY")?,
            vector_index_url: require("VECTOR_INDEX_URL")?,
            vector_api_key: require("VECTOR_API_KEY")?,
        })
    }
}

fn require(key: &str) -> Result<String, IngestError> {
    std::env::var(key).map_err(|_| IngestError::Invalid(format!("{key} is not set")))
}
