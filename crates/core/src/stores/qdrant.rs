use crate::store::{CollectionInfo, Distance, Point, PointId, ScoredPoint};
use crate::traits::CollectionStore;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";

/// Qdrant over its REST API.
pub struct QdrantStore {
    base: Url,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, SearchError> {
        Self::with_timeout(endpoint, api_key, Duration::from_secs(30))
    }

    pub fn with_timeout(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            base: Url::parse(endpoint)?,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SearchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SearchError::Request(format!("qdrant url cannot be a base: {}", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SearchError> {
        Ok(self.authorize(request).send().await?)
    }

    async fn expect_success(response: Response) -> Result<Value, SearchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("{status}: {body}"),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CollectionStore for QdrantStore {
    async fn exists(&self, name: &str) -> Result<bool, SearchError> {
        let url = self.url(&["collections", name])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success(response).await?;
        Ok(true)
    }

    async fn create(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), SearchError> {
        let url = self.url(&["collections", name])?;
        let body = json!({
            "vectors": {
                "size": dimensions,
                "distance": distance.to_string(),
            }
        });
        let response = self.send(self.client.put(url).json(&body)).await?;
        Self::expect_success(response).await?;
        debug!(collection = name, dimensions, %distance, "created qdrant collection");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), SearchError> {
        let url = self.url(&["collections", name])?;
        let response = self.send(self.client.delete(url)).await?;
        Self::expect_success(response).await?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), SearchError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut url = self.url(&["collections", name, "points"])?;
        url.query_pairs_mut().append_pair("wait", "true");

        let response = self
            .send(self.client.put(url).json(&json!({ "points": points })))
            .await?;
        Self::expect_success(response).await?;
        debug!(collection = name, count = points.len(), "upserted points to qdrant");
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, SearchError> {
        let url = self.url(&["collections", name, "points", "search"])?;
        let body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });

        let response = self.send(self.client.post(url).json(&body)).await?;
        let parsed = Self::expect_success(response).await?;
        parse_search_response(&parsed)
    }

    async fn list_collections(&self) -> Result<Vec<String>, SearchError> {
        let url = self.url(&["collections"])?;
        let response = self.send(self.client.get(url)).await?;
        let parsed = Self::expect_success(response).await?;

        let names = parsed
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(|collections| {
                collections
                    .iter()
                    .filter_map(|collection| collection.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(names)
    }

    async fn info(&self, name: &str) -> Result<Option<CollectionInfo>, SearchError> {
        let url = self.url(&["collections", name])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let parsed = Self::expect_success(response).await?;
        parse_collection_info(name, &parsed).map(Some)
    }
}

fn parse_search_response(parsed: &Value) -> Result<Vec<ScoredPoint>, SearchError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "search response has no result array".to_string(),
        })?;

    let mut points = Vec::with_capacity(hits.len());
    for hit in hits {
        let id = match hit.get("id") {
            Some(Value::Number(number)) => number.as_u64().map(PointId::Num),
            Some(Value::String(uuid)) => Some(PointId::Uuid(uuid.clone())),
            _ => None,
        };
        let Some(id) = id else {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("search hit has no usable id: {hit}"),
            });
        };

        let Some(score) = hit.pointer("/score").and_then(Value::as_f64) else {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("search hit {id} has no score"),
            });
        };
        let Some(text) = hit.pointer("/payload/text").and_then(Value::as_str) else {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: format!("search hit {id} has no payload text"),
            });
        };
        let (score, text) = (score as f32, text.to_string());

        points.push(ScoredPoint { id, score, text });
    }

    Ok(points)
}

fn parse_collection_info(name: &str, parsed: &Value) -> Result<CollectionInfo, SearchError> {
    let vectors = parsed
        .pointer("/result/config/params/vectors")
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: format!("collection {name} has no vector params"),
        })?;

    let distance = match vectors.get("distance").and_then(Value::as_str) {
        Some("Dot") => Distance::Dot,
        Some("Euclid") => Distance::Euclid,
        _ => Distance::Cosine,
    };

    Ok(CollectionInfo {
        name: name.to_string(),
        points_count: parsed
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        vector_size: vectors.get("size").and_then(Value::as_u64).unwrap_or(0) as usize,
        distance,
    })
}
