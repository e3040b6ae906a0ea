//! Fake collaborators for exercising the ingestion pipeline without any
//! network dependency.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crawldex::crawler::Crawler;
use crawldex::embedding::{EmbeddingProvider, MockEmbeddingProvider};
use crawldex::types::{IngestError, Page, QueryMatch, VectorRecord};
use crawldex::vector_store::VectorStore;

/// Scripted crawl provider behavior.
#[derive(Clone, Debug)]
pub enum FakeCrawl {
    /// Crawl starts and completes, returning these pages.
    Pages(Vec<Page>),
    /// Provider rejects the start request (no job id).
    StartFailure(String),
    /// Crawl starts but the provider reports the job as failed.
    CrawlFailure(String),
}

pub struct FakeCrawler {
    behavior: FakeCrawl,
    starts: AtomicUsize,
}

impl FakeCrawler {
    pub fn new(behavior: FakeCrawl) -> Self {
        Self {
            behavior,
            starts: AtomicUsize::new(0),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Crawler for FakeCrawler {
    async fn start_crawl(&self, _url: &str, _page_limit: u32) -> Result<String, IngestError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            FakeCrawl::StartFailure(message) => Err(IngestError::CrawlStart(message.clone())),
            _ => Ok("fake-job".to_string()),
        }
    }

    async fn collect_all_pages(&self, _job_id: &str) -> Result<Vec<Page>, IngestError> {
        match &self.behavior {
            FakeCrawl::Pages(pages) => Ok(pages.clone()),
            FakeCrawl::CrawlFailure(message) => Err(IngestError::CrawlFailed(message.clone())),
            FakeCrawl::StartFailure(message) => Err(IngestError::CrawlStart(message.clone())),
        }
    }
}

/// Deterministic embedder that counts how many chunks were embedded.
pub struct CountingEmbedder {
    inner: MockEmbeddingProvider,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: MockEmbeddingProvider::new(dimension),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// In-memory namespaced vector index with idempotent upsert by id.
#[derive(Default)]
pub struct InMemoryVectorStore {
    namespaces: Mutex<HashMap<String, BTreeMap<String, VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All vectors stored under `namespace`, ordered by id.
    pub fn vectors_in(&self, namespace: &str) -> Vec<VectorRecord> {
        self.namespaces
            .lock()
            .expect("store mutex poisoned")
            .get(namespace)
            .map(|vectors| vectors.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_in(&self, namespace: &str) -> usize {
        self.vectors_in(namespace).len()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<(), IngestError> {
        let mut namespaces = self.namespaces.lock().expect("store mutex poisoned");
        let entry = namespaces.entry(namespace.to_string()).or_default();
        for vector in vectors {
            entry.insert(vector.id.clone(), vector.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<QueryMatch>, IngestError> {
        let namespaces = self.namespaces.lock().expect("store mutex poisoned");
        let Some(entry) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = entry
            .values()
            .filter(|candidate| {
                let Some(filter) = &filter else { return true };
                let metadata = serde_json::to_value(&candidate.metadata).unwrap_or_default();
                filter
                    .as_object()
                    .is_some_and(|fields| fields.iter().all(|(k, v)| metadata.get(k) == Some(v)))
            })
            .map(|candidate| QueryMatch {
                id: candidate.id.clone(),
                score: cosine(vector, &candidate.values),
                metadata: serde_json::to_value(&candidate.metadata).unwrap_or_default(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
