//! Dedicated vector index backed by a Qdrant server, over its REST API.
//!
//! Endpoints used:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | inspect collection | `GET /collections/{name}` |
//! | create collection | `PUT /collections/{name}` |
//! | upsert | `PUT /collections/{name}/points?wait=true` |
//! | search | `POST /collections/{name}/points/search` |
//!
//! If `QDRANT_API_KEY` is set it is sent in the `api-key` header. Requests
//! are not retried; a failed request surfaces as [`Error::Backend`] or
//! [`Error::Http`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{check_points, check_spec_name, CollectionSpec, VectorIndex};
use crate::config::IndexConfig;
use crate::embedding::check_dims;
use crate::error::{Error, Result};
use crate::models::{Point, ScoredPoint};

pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dims: OnceCell<usize>,
}

impl QdrantIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let api_key = std::env::var("QDRANT_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_api_key(config, api_key.as_deref())
    }

    pub fn with_api_key(config: &IndexConfig, api_key: Option<&str>) -> Result<Self> {
        if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "index.url must be an http(s) URL, got '{}'",
                config.url
            )));
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key.trim())
                .map_err(|_| Error::Config("QDRANT_API_KEY is not a valid header value".into()))?;
            headers.insert("api-key", value);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dims: OnceCell::new(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Dimension of the existing collection, or `None` if it does not exist.
    async fn fetch_dims(&self) -> Result<Option<usize>> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = check_status(response).await?.json().await?;
        parse_collection_dims(&body).map(Some).ok_or_else(|| {
            Error::backend("qdrant", "collection info has no single vector size")
        })
    }

    async fn dims(&self) -> Result<usize> {
        self.dims
            .get_or_try_init(|| async {
                self.fetch_dims().await?.ok_or_else(|| {
                    Error::backend(
                        "qdrant",
                        format!("collection '{}' does not exist", self.collection),
                    )
                })
            })
            .await
            .copied()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(Error::backend("qdrant", format!("HTTP {}: {}", status, body)))
}

/// `result.config.params.vectors.size` for an unnamed-vector collection.
fn parse_collection_dims(body: &Value) -> Option<usize> {
    body.pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|d| d as usize)
}

#[derive(Serialize)]
struct QdrantPoint<'a> {
    id: u64,
    vector: &'a [f32],
    payload: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: Value,
    score: f64,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

fn parse_search_response(body: Value) -> Result<Vec<ScoredPoint>> {
    let parsed: SearchResponse = serde_json::from_value(body)?;
    parsed
        .result
        .into_iter()
        .map(|hit| {
            let id = hit.id.as_u64().ok_or_else(|| {
                Error::backend("qdrant", format!("unsupported point id {}", hit.id))
            })?;
            Ok(ScoredPoint {
                id,
                score: hit.score,
                payload: hit.payload,
            })
        })
        .collect()
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        check_spec_name(self, spec)?;
        match self.fetch_dims().await? {
            Some(existing) if existing != spec.dims => {
                return Err(Error::CollectionConflict {
                    name: spec.name.clone(),
                    existing,
                    requested: spec.dims,
                });
            }
            Some(_) => {
                debug!(collection = %spec.name, "collection already exists");
            }
            None => {
                let body = serde_json::json!({
                    "vectors": { "size": spec.dims, "distance": "Cosine" }
                });
                let response = self
                    .client
                    .put(self.collection_url())
                    .json(&body)
                    .send()
                    .await?;
                check_status(response).await?;
                info!(collection = %spec.name, dims = spec.dims, "created collection");
            }
        }
        let _ = self.dims.set(spec.dims);
        Ok(())
    }

    async fn upsert(&self, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        check_points(self.dims().await?, points)?;

        let body: Vec<QdrantPoint<'_>> = points
            .iter()
            .map(|p| QdrantPoint {
                id: p.id,
                vector: &p.vector,
                payload: &p.payload,
            })
            .collect();
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&serde_json::json!({ "points": body }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        check_dims(self.dims().await?, vector)?;
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&SearchRequest {
                vector,
                limit,
                with_payload: true,
            })
            .send()
            .await?;
        let body: Value = check_status(response).await?.json().await?;
        parse_search_response(body)
    }
}
