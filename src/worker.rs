//! The ingestion worker: queue consumer and pipeline orchestrator.
//!
//! One worker processes one crawl job at a time — a deliberate backpressure
//! choice so the crawl and embedding providers' rate limits are respected.
//! Horizontal scale comes from running more worker processes against the
//! same queue; the transactional claim guarantees each job is delivered to
//! a single active consumer.
//!
//! A job either completes as a unit or is marked failed as a unit. Partial
//! vector upserts from a failed attempt are tolerated: vector ids are
//! deterministic and upserts idempotent, so redelivery overwrites rather
//! than duplicates (at-least-once with overwrite semantics).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::chunker::{chunk_text, stable_id};
use crate::config::WorkerSettings;
use crate::crawler::Crawler;
use crate::embedding::EmbeddingProvider;
use crate::queue::{JobQueue, QueuedJob};
use crate::status::StatusStore;
use crate::types::{CrawlRequest, IngestError, Page, ProjectStatus, VectorMetadata, VectorRecord};
use crate::vector_store::VectorStore;

/// Consumes queued [`CrawlRequest`]s and drives each one through
/// crawl → chunk → embed → upsert → status finalization.
///
/// All collaborators are injected at construction, so the worker is fully
/// unit-testable with fake clients.
pub struct IngestionWorker {
    crawler: Arc<dyn Crawler>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    queue: JobQueue,
    status: StatusStore,
    settings: WorkerSettings,
}

impl IngestionWorker {
    pub fn new(
        crawler: Arc<dyn Crawler>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        queue: JobQueue,
        status: StatusStore,
        settings: WorkerSettings,
    ) -> Result<Self, IngestError> {
        settings.validate()?;
        Ok(Self {
            crawler,
            embedder,
            vectors,
            queue,
            status,
            settings,
        })
    }

    /// Runs the consume loop until `shutdown` flips to `true`.
    ///
    /// Shutdown is graceful: no new job is claimed after the signal, but an
    /// in-flight job runs to completion first. A process killed mid-job
    /// leaves its crawl record in `PROCESSING` indefinitely; there is no
    /// lease or heartbeat, so that case needs external reconciliation.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("ingestion worker started; waiting for jobs");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.claim().await {
                Ok(Some(job)) => {
                    self.handle_job(job).await;
                    continue;
                }
                Ok(None) => {
                    if let Err(err) = self.queue.prune().await {
                        warn!(%err, "queue retention pruning failed");
                    }
                }
                Err(err) => {
                    error!(%err, "queue claim failed");
                }
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(self.settings.queue_poll_interval) => {}
            }
        }
        info!("ingestion worker stopped");
    }

    /// Processes one delivery and settles it with the queue.
    ///
    /// Job-level failures never escape: the crawl and project records are
    /// marked `FAILED` and the queue applies its own retry/backoff policy,
    /// while the loop moves on to the next job.
    #[instrument(skip(self, job), fields(job_id = %job.id, crawl_id = %job.request.crawl_id))]
    pub async fn handle_job(&self, job: QueuedJob) {
        info!(
            url = %job.request.website_url,
            attempt = job.attempts_made,
            "processing crawl job"
        );

        match self.process(&job.request).await {
            Ok(pages) => {
                info!(pages, "crawl job completed");
                if let Err(err) = self.queue.complete(&job.id).await {
                    error!(%err, "failed to settle completed job");
                }
            }
            Err(err) => {
                let message = err.to_string();
                error!(error = %message, "crawl job failed");

                if let Err(status_err) = self
                    .status
                    .mark_failed(&job.request.crawl_id, &message)
                    .await
                {
                    error!(%status_err, "failed to record crawl failure");
                }
                if let Err(status_err) = self
                    .status
                    .set_project_status(&job.request.project_id, ProjectStatus::Failed)
                    .await
                {
                    error!(%status_err, "failed to record project failure");
                }

                match self.queue.fail(&job.id, &message).await {
                    Ok(outcome) => debug!(?outcome, "job re-signaled to queue"),
                    Err(queue_err) => error!(%queue_err, "failed to re-signal job"),
                }
            }
        }
    }

    /// The per-job pipeline. Any error aborts the whole job; the caller
    /// owns the failure path.
    async fn process(&self, request: &CrawlRequest) -> Result<usize, IngestError> {
        self.status.mark_processing(&request.crawl_id).await?;

        let provider_job = self
            .crawler
            .start_crawl(&request.website_url, self.settings.page_limit)
            .await?;
        debug!(%provider_job, "crawl started");

        let pages = self.crawler.collect_all_pages(&provider_job).await?;
        info!(pages = pages.len(), "crawl drained");

        let vectors = self.vectorize(request, &pages).await?;

        if !vectors.is_empty() {
            info!(vectors = vectors.len(), "upserting vectors");
            for batch in vectors.chunks(self.settings.upsert_batch_size) {
                self.vectors.upsert(&request.namespace, batch).await?;
            }
        }

        self.status
            .mark_completed(&request.crawl_id, pages.len() as u32)
            .await?;
        self.status
            .set_project_status(&request.project_id, ProjectStatus::Ready)
            .await?;

        Ok(pages.len())
    }

    /// Chunks every non-empty page and embeds each chunk in index order,
    /// pacing consecutive embedding calls per the settings.
    async fn vectorize(
        &self,
        request: &CrawlRequest,
        pages: &[Page],
    ) -> Result<Vec<VectorRecord>, IngestError> {
        let mut vectors = Vec::new();

        for page in pages {
            if page.text_content.trim().is_empty() {
                continue;
            }

            let chunks = chunk_text(
                &page.text_content,
                self.settings.chunk_size,
                self.settings.chunk_overlap,
            );
            let chunk_count = chunks.len();

            for (index, chunk) in chunks.into_iter().enumerate() {
                let values = self.embedder.embed(&chunk).await?;
                vectors.push(VectorRecord {
                    id: stable_id(&request.crawl_id, &page.url, index),
                    values,
                    metadata: VectorMetadata {
                        project_id: request.project_id.clone(),
                        crawl_id: request.crawl_id.clone(),
                        url: page.url.clone(),
                        title: page.title.clone(),
                        content: chunk,
                        chunk_index: index,
                    },
                });

                if !self.settings.embed_pacing.is_zero() && index + 1 < chunk_count {
                    tokio::time::sleep(self.settings.embed_pacing).await;
                }
            }
        }

        Ok(vectors)
    }
}

impl std::fmt::Debug for IngestionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionWorker")
            .field("settings", &self.settings)
            .finish()
    }
}
