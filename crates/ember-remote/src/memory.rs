//! Semantic memory-store client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::RemoteError;

/// Flat metadata attached to a memory. Values should be scalars.
pub type MemoryMetadata = BTreeMap<String, Value>;

/// Comparison used by a [`MemoryFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Gte,
}

/// A structured predicate over memory metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub key: String,
    pub op: FilterOp,
    pub value: Value,
}

impl MemoryFilter {
    /// `key == value`.
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// `key >= value`.
    pub fn gte(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            op: FilterOp::Gte,
            value: value.into(),
        }
    }
}

/// A search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: MemoryMetadata,
    #[serde(default)]
    pub score: Option<f64>,
}

/// A remote semantic store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store content with metadata, returning the service's id.
    async fn create(&self, content: &str, metadata: &MemoryMetadata)
    -> Result<String, RemoteError>;

    /// Search by free-text query, narrowed by metadata predicates.
    async fn search(
        &self,
        query: &str,
        filters: &[MemoryFilter],
        limit: usize,
    ) -> Result<Vec<MemoryHit>, RemoteError>;
}

/// HTTP client for the memory service.
pub struct MemoryClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    content: &'a str,
    metadata: &'a MemoryMetadata,
}

#[derive(Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    filters: &'a [MemoryFilter],
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<MemoryHit>,
}

impl MemoryClient {
    /// Create a new client.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MemoryStore for MemoryClient {
    async fn create(
        &self,
        content: &str,
        metadata: &MemoryMetadata,
    ) -> Result<String, RemoteError> {
        let response: CreateResponse = self
            .post_json("/v1/memories", &CreateRequest { content, metadata })
            .await?;
        debug!(id = %response.id, "memory created");
        Ok(response.id)
    }

    async fn search(
        &self,
        query: &str,
        filters: &[MemoryFilter],
        limit: usize,
    ) -> Result<Vec<MemoryHit>, RemoteError> {
        let response: SearchResponse = self
            .post_json(
                "/v1/search",
                &SearchRequest {
                    q: query,
                    filters,
                    limit,
                },
            )
            .await?;
        debug!(query, hits = response.results.len(), "memory search");
        Ok(response.results)
    }
}

/// Stand-in used when no memory service is configured. Every call fails.
pub struct DisabledMemory;

#[async_trait]
impl MemoryStore for DisabledMemory {
    async fn create(&self, _: &str, _: &MemoryMetadata) -> Result<String, RemoteError> {
        Err(RemoteError::Disabled("memory store"))
    }

    async fn search(
        &self,
        _: &str,
        _: &[MemoryFilter],
        _: usize,
    ) -> Result<Vec<MemoryHit>, RemoteError> {
        Err(RemoteError::Disabled("memory store"))
    }
}
