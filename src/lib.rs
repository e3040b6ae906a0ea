//! ```text
//! API layer ──► service::IngestService ──► queue::JobQueue (SQLite, durable)
//!                        │                        │
//!                        └─► status::StatusStore  │ delivery (at-least-once)
//!                                    ▲            ▼
//!                                    │   worker::IngestionWorker
//!                                    │            │
//!                   crawler::Crawler ◄────────────┤ start + drain pages
//!                   chunker::chunk_text ◄─────────┤ overlapping windows
//!                   embedding::EmbeddingProvider ◄┤ retry + backoff
//!                   vector_store::VectorStore ◄───┘ batched namespaced upsert
//! ```
//!
//! Crawldex ingests a website into a searchable knowledge base: a seed URL
//! is crawled, each page's text is split into overlapping chunks, every
//! chunk is embedded, and the vectors land in a namespaced index keyed by
//! deterministic ids so re-runs overwrite instead of duplicate.

pub mod chunker;
pub mod config;
pub mod crawler;
pub mod db;
pub mod embedding;
pub mod queue;
pub mod service;
pub mod status;
pub mod types;
pub mod vector_store;
pub mod worker;

pub use chunker::{chunk_text, stable_id};
pub use config::{EnvConfig, WorkerSettings};
pub use crawler::{Crawler, HttpCrawlClient};
pub use embedding::{
    EmbeddingProvider, Fault, HttpEmbeddingClient, MockEmbeddingProvider, RetryPolicy,
    retry_with_backoff,
};
pub use queue::{FailOutcome, JobQueue, QueuePolicy, QueuedJob};
pub use service::IngestService;
pub use status::StatusStore;
pub use types::{
    CrawlRecord, CrawlRequest, CrawlStatus, IngestError, Page, ProjectRecord, ProjectStatus,
    QueryMatch, VectorMetadata, VectorRecord,
};
pub use vector_store::{HttpVectorStore, VectorStore};
pub use worker::IngestionWorker;
