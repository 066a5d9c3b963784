use crate::error::EmbeddingError;
use crate::store::{CollectionInfo, Distance, Point, ScoredPoint};
use crate::SearchError;
use async_trait::async_trait;

/// Named vector collections with batched upsert and nearest-neighbour query.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool, SearchError>;

    async fn create(&self, name: &str, dimensions: usize, distance: Distance)
        -> Result<(), SearchError>;

    async fn delete(&self, name: &str) -> Result<(), SearchError>;

    /// Writes one batch. Points with an id already present are replaced.
    async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), SearchError>;

    /// Returns at most `limit` points scoring at or above `score_threshold`,
    /// best first.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, SearchError>;

    async fn list_collections(&self) -> Result<Vec<String>, SearchError>;

    /// `None` when the collection does not exist.
    async fn info(&self, name: &str) -> Result<Option<CollectionInfo>, SearchError>;
}

/// Text to a vector of a fixed, per-instance dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Prompt in, completion text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, model: Option<&str>, prompt: &str) -> Result<String, SearchError>;
}
