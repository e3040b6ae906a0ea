//! Crawl provider boundary.
//!
//! Starting a crawl returns a provider-side job id; collecting results is a
//! polling state machine (`scraping` → `{completed, failed}`) with an inner
//! pagination loop: every poll drains all `next` continuation links before
//! the poll counts as done, so no page batch is lost between polls.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::types::{IngestError, Page};

/// External crawling service: start a job, then drain it to completion.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Starts a crawl of `url`, capped at `page_limit` pages. Fails if the
    /// provider rejects the URL or returns no job id.
    async fn start_crawl(&self, url: &str, page_limit: u32) -> Result<String, IngestError>;

    /// Blocks until the job reaches a terminal state, accumulating every
    /// returned page (including paginated continuations) along the way.
    async fn collect_all_pages(&self, job_id: &str) -> Result<Vec<Page>, IngestError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartCrawlRequest<'a> {
    url: &'a str,
    limit: u32,
    scrape_options: ScrapeOptions,
}

#[derive(Serialize)]
struct ScrapeOptions {
    formats: Vec<&'static str>,
}

#[derive(Deserialize)]
struct StartCrawlResponse {
    id: Option<String>,
    error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JobStatus {
    Scraping,
    Completed,
    Failed,
}

#[derive(Deserialize)]
struct CrawlStatusResponse {
    status: JobStatus,
    #[serde(default)]
    data: Vec<RawPage>,
    /// Absolute URL of the next page of results, when the batch is paginated.
    next: Option<String>,
    error: Option<String>,
}

/// Page shape as returned by the provider; heterogeneous across SDK
/// versions, hence every field optional and normalized in one place.
#[derive(Deserialize)]
struct RawPage {
    markdown: Option<String>,
    url: Option<String>,
    #[serde(default)]
    metadata: RawPageMetadata,
}

#[derive(Default, Deserialize)]
struct RawPageMetadata {
    title: Option<String>,
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
}

impl RawPage {
    fn normalize(self) -> Page {
        let url = self
            .metadata
            .source_url
            .or(self.url)
            .unwrap_or_default();
        let title = self.metadata.title.unwrap_or_else(|| url.clone());
        Page {
            url,
            title,
            text_content: self.markdown.unwrap_or_default(),
        }
    }
}

/// HTTP client for a Firecrawl-style crawl API.
#[derive(Clone)]
pub struct HttpCrawlClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
}

impl HttpCrawlClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| IngestError::Crawl(format!("failed to build client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            poll_interval: Duration::from_secs(2),
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn get_status(&self, url: &str) -> Result<CrawlStatusResponse, IngestError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| IngestError::Crawl(format!("transport error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Crawl(format!(
                "status fetch failed ({status}): {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|err| IngestError::Crawl(format!("malformed status response: {err}")))
    }

    /// Follows `next` links until the current batch is exhausted.
    async fn drain_pagination(
        &self,
        mut next: Option<String>,
        pages: &mut Vec<Page>,
    ) -> Result<(), IngestError> {
        while let Some(next_url) = next {
            debug!(%next_url, "following pagination continuation");
            let batch = self.get_status(&next_url).await?;
            pages.extend(batch.data.into_iter().map(RawPage::normalize));
            next = batch.next;
        }
        Ok(())
    }
}

#[async_trait]
impl Crawler for HttpCrawlClient {
    #[instrument(skip(self), fields(url, page_limit))]
    async fn start_crawl(&self, url: &str, page_limit: u32) -> Result<String, IngestError> {
        let request = StartCrawlRequest {
            url,
            limit: page_limit,
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };
        let response = self
            .client
            .post(format!("{}/v1/crawl", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| IngestError::Crawl(format!("transport error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::CrawlStart(format!(
                "provider rejected crawl ({status}): {body}"
            )));
        }

        let parsed: StartCrawlResponse = response
            .json()
            .await
            .map_err(|err| IngestError::CrawlStart(format!("malformed start response: {err}")))?;

        parsed.id.ok_or_else(|| {
            IngestError::CrawlStart(
                parsed
                    .error
                    .unwrap_or_else(|| "no job id returned".to_string()),
            )
        })
    }

    #[instrument(skip(self))]
    async fn collect_all_pages(&self, job_id: &str) -> Result<Vec<Page>, IngestError> {
        let status_url = format!("{}/v1/crawl/{job_id}", self.base_url);
        let mut pages = Vec::new();

        loop {
            let poll = self.get_status(&status_url).await?;

            if poll.status == JobStatus::Failed {
                return Err(IngestError::CrawlFailed(
                    poll.error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }

            pages.extend(poll.data.into_iter().map(RawPage::normalize));
            self.drain_pagination(poll.next, &mut pages).await?;

            if poll.status == JobStatus::Completed {
                info!(pages = pages.len(), "crawl completed");
                return Ok(pages);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl std::fmt::Debug for HttpCrawlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCrawlClient")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
