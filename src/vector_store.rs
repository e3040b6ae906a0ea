//! Namespaced vector index boundary.
//!
//! Upserts are idempotent by vector id and scoped to a namespace; queries
//! accept an optional metadata filter so tenants sharing a namespace cannot
//! leak into each other's results. Batch partitioning (≤ 100 vectors per
//! call) is owned by the worker, not by this client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::types::{IngestError, QueryMatch, VectorRecord};

/// Namespaced upsert/query interface over the external vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or overwrites `vectors` under `namespace`.
    async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<(), IngestError>;

    /// Similarity search within `namespace`, optionally restricted by a
    /// metadata filter (e.g. `{"projectId": "p1"}`).
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<QueryMatch>, IngestError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    namespace: &'a str,
    vectors: &'a [VectorRecord],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

/// HTTP client for a Pinecone-style vector index.
#[derive(Clone)]
pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpVectorStore {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| IngestError::VectorStore(format!("failed to build client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response, IngestError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| IngestError::VectorStore(format!("transport error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::VectorStore(format!(
                "request failed ({status}): {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    #[instrument(skip(self, vectors), fields(namespace, count = vectors.len()))]
    async fn upsert(&self, namespace: &str, vectors: &[VectorRecord]) -> Result<(), IngestError> {
        if vectors.is_empty() {
            return Ok(());
        }
        let request = UpsertRequest { namespace, vectors };
        self.post("/vectors/upsert", &request).await?;
        Ok(())
    }

    #[instrument(skip(self, vector, filter), fields(namespace, top_k))]
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<QueryMatch>, IngestError> {
        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            filter,
            include_metadata: true,
        };
        let response = self.post("/query", &request).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|err| IngestError::VectorStore(format!("malformed response: {err}")))?;
        Ok(parsed.matches)
    }
}

impl std::fmt::Debug for HttpVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVectorStore")
            .field("base_url", &self.base_url)
            .finish()
    }
}
