//! Producer-side API: what the dashboard's request handlers call.
//!
//! Creates the `PENDING` crawl record and enqueues the matching
//! [`CrawlRequest`] so the worker picks it up; also exposes the status
//! read-back the dashboard polls.

use tracing::{info, instrument};
use url::Url;
use uuid::Uuid;

use crate::queue::JobQueue;
use crate::status::StatusStore;
use crate::types::{CrawlRecord, CrawlRequest, IngestError, ProjectRecord, ProjectStatus};

/// Front door for starting crawls and reading their status.
#[derive(Clone, Debug)]
pub struct IngestService {
    queue: JobQueue,
    status: StatusStore,
}

impl IngestService {
    pub fn new(queue: JobQueue, status: StatusStore) -> Self {
        Self { queue, status }
    }

    /// Registers a new project with a dedicated vector-store namespace.
    #[instrument(skip(self))]
    pub async fn create_project(&self, name_hint: &str) -> Result<ProjectRecord, IngestError> {
        let project_id = Uuid::new_v4().to_string();
        let namespace = format!("proj-{project_id}");
        let project = self.status.create_project(&project_id, &namespace).await?;
        info!(%project_id, hint = name_hint, "project created");
        Ok(project)
    }

    /// Validates the seed URL, creates the `PENDING` crawl record, and
    /// enqueues the crawl request under the project's namespace. Returns
    /// the new crawl id.
    ///
    /// Overlapping crawls for the same project are not rejected here: the
    /// deterministic vector ids make concurrent runs last-write-wins at the
    /// vector level, and the project status mirrors whichever crawl
    /// finishes last.
    #[instrument(skip(self))]
    pub async fn enqueue_crawl(
        &self,
        project_id: &str,
        website_url: &str,
    ) -> Result<String, IngestError> {
        let parsed = Url::parse(website_url)
            .map_err(|err| IngestError::Invalid(format!("invalid website url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IngestError::Invalid(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }

        let project = self.status.get_project(project_id).await?;
        let crawl_id = Uuid::new_v4().to_string();
        self.status.create_crawl(&crawl_id, project_id).await?;

        let request = CrawlRequest {
            crawl_id: crawl_id.clone(),
            project_id: project_id.to_string(),
            website_url: website_url.to_string(),
            namespace: project.namespace,
        };
        self.queue.enqueue(&request).await?;

        info!(%crawl_id, %project_id, url = website_url, "crawl enqueued");
        Ok(crawl_id)
    }

    /// Status read-back for the dashboard.
    pub async fn crawl_status(&self, crawl_id: &str) -> Result<CrawlRecord, IngestError> {
        self.status.get_crawl(crawl_id).await
    }

    /// Project readiness, mirroring the most recent crawl outcome.
    pub async fn project_status(&self, project_id: &str) -> Result<ProjectStatus, IngestError> {
        Ok(self.status.get_project(project_id).await?.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::queue::QueuePolicy;
    use crate::types::CrawlStatus;

    async fn service() -> IngestService {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        IngestService::new(
            JobQueue::new(pool.clone(), QueuePolicy::default()),
            StatusStore::new(pool),
        )
    }

    #[tokio::test]
    async fn enqueue_creates_pending_crawl() {
        let service = service().await;
        let project = service.create_project("docs site").await.unwrap();

        let crawl_id = service
            .enqueue_crawl(&project.id, "https://example.com")
            .await
            .unwrap();

        let crawl = service.crawl_status(&crawl_id).await.unwrap();
        assert_eq!(crawl.status, CrawlStatus::Pending);
        assert_eq!(crawl.project_id, project.id);
        assert!(crawl.error.is_none());
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let service = service().await;
        let project = service.create_project("docs").await.unwrap();

        assert!(
            service
                .enqueue_crawl(&project.id, "ftp://example.com")
                .await
                .is_err()
        );
        assert!(
            service
                .enqueue_crawl(&project.id, "not a url")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn rejects_unknown_project() {
        let service = service().await;
        assert!(
            service
                .enqueue_crawl("missing", "https://example.com")
                .await
                .is_err()
        );
    }
}
