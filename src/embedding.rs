//! Embedding provider boundary.
//!
//! The HTTP client validates every response at the edge (present, numeric,
//! exactly the configured dimensionality) and retries only transient
//! provider faults — rate limits and 5xx-class errors — with exponential
//! backoff plus jitter. Malformed responses and dimension mismatches are
//! defects and fail immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::types::IngestError;

/// Anything that can turn text into a fixed-dimension vector.
///
/// The worker holds providers behind this trait so tests can substitute a
/// deterministic fake.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError>;

    /// Dimensionality every returned vector must have.
    fn dimension(&self) -> usize;
}

/// Exponential backoff schedule for transient provider faults.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay before attempt `attempt` (1-based):
    /// `min(max_delay, base_delay * 2^(attempt-1))`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let scaled = self.base_delay.saturating_mul(1u32 << exp);
        scaled.min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64)
        };
        self.delay_for_attempt(attempt) + Duration::from_millis(jitter_ms)
    }
}

/// Classification of one failed attempt.
#[derive(Debug)]
pub enum Fault {
    /// Rate limit, 5xx, or transport failure: worth retrying after backoff.
    Transient(String),
    /// Bad request, malformed response, dimension mismatch: retrying the
    /// same input cannot succeed.
    Permanent(IngestError),
}

/// Runs `op` until it succeeds, fails permanently, or exhausts
/// `policy.max_retries` attempts, sleeping the jittered backoff between
/// transient failures.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, IngestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Fault>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Fault::Permanent(err)) => return Err(err),
            Err(Fault::Transient(reason)) => {
                if attempt >= policy.max_retries {
                    return Err(IngestError::Embedding(format!(
                        "{reason}; giving up after {attempt} attempts"
                    )));
                }
                let delay = policy.jittered_delay(attempt);
                warn!(attempt, ?delay, "{reason}; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    content: EmbedContent<'a>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddedValues>,
}

#[derive(Deserialize)]
struct EmbeddedValues {
    values: Option<Vec<f32>>,
}

/// HTTP embedding client for `embedContent`-style providers.
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    dimension: usize,
    retry: RetryPolicy,
}

impl HttpEmbeddingClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        dimension: usize,
        retry: RetryPolicy,
    ) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| IngestError::Embedding(format!("failed to build client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embedContent", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            dimension,
            retry,
        })
    }

    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// One attempt: send, classify the failure mode, validate the body.
    async fn attempt(&self, request: &EmbedRequest<'_>) -> Result<Vec<f32>, Fault> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            // Connection resets and timeouts are treated like 5xx.
            .map_err(|err| Fault::Transient(format!("transport error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if Self::is_retryable(status) {
                return Err(Fault::Transient(format!("provider fault ({status})")));
            }
            return Err(Fault::Permanent(IngestError::Embedding(format!(
                "provider rejected request ({status}): {body}"
            ))));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|err| {
            Fault::Permanent(IngestError::Embedding(format!("malformed response: {err}")))
        })?;

        let values = parsed
            .embedding
            .and_then(|embedding| embedding.values)
            .ok_or_else(|| {
                Fault::Permanent(IngestError::Embedding(
                    "response missing embedding.values".to_string(),
                ))
            })?;

        if values.len() != self.dimension {
            return Err(Fault::Permanent(IngestError::Embedding(format!(
                "unexpected embedding dimension: {} (expected {})",
                values.len(),
                self.dimension
            ))));
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        let request = EmbedRequest {
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
        };
        retry_with_backoff(&self.retry, || self.attempt(&request)).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

impl std::fmt::Debug for HttpEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingClient")
            .field("endpoint", &self.endpoint)
            .field("dimension", &self.dimension)
            .finish()
    }
}

/// Deterministic in-process provider for tests and offline runs.
///
/// Hash-seeded so the same text always maps to the same vector without any
/// network dependency.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(text.as_bytes());
        let values = (0..self.dimension)
            .map(|i| f32::from(digest[i % digest.len()]) / 255.0)
            .collect();
        debug!(dimension = self.dimension, "produced mock embedding");
        Ok(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn transient_faults_up_to_the_limit_still_succeed() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(3), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(Fault::Transient("rate limited".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_transient_faults_exhaust_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Fault::Transient("server error".into())) }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("giving up after 3 attempts"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_faults_never_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Fault::Permanent(IngestError::Embedding("bad input".into()))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new(8);
        let first = provider.embed("hello").await.unwrap();
        let second = provider.embed("hello").await.unwrap();
        let other = provider.embed("goodbye").await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 8);
    }
}
