use crate::models::ScoredResult;
use crate::traits::{CollectionStore, Embedder};
use crate::SearchError;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// How many merged results survive a multi-collection query.
pub const DEFAULT_FINAL_TOP_K: usize = 3;
pub const DEFAULT_QUERY_LIMIT: usize = 5;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// `limit` bounds the candidates taken from each collection; `final_top_k`
/// bounds the merged list. The two are independent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    pub limit: usize,
    pub score_threshold: f32,
    pub final_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            final_top_k: DEFAULT_FINAL_TOP_K,
        }
    }
}

impl RetrievalConfig {
    pub fn new(limit: usize, score_threshold: f32) -> Self {
        Self {
            limit,
            score_threshold,
            ..Self::default()
        }
    }

    pub fn with_final_top_k(mut self, final_top_k: usize) -> Self {
        self.final_top_k = final_top_k;
        self
    }
}

pub struct RetrievalAggregator {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CollectionStore>,
}

impl RetrievalAggregator {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn CollectionStore>) -> Self {
        Self { embedder, store }
    }

    /// Queries every collection in the store and merges the hits.
    ///
    /// Per-collection queries run concurrently. Hits are sorted by descending
    /// score with a stable sort, so equal scores keep collection discovery
    /// order and, within a collection, the store's order. The merged list is
    /// cut to `config.final_top_k`.
    pub async fn query_all(
        &self,
        query_text: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        let query_text = non_empty_query(query_text)?;
        let collections = self.store.list_collections().await?;
        if collections.is_empty() {
            debug!("no collections to query");
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query_text).await?;
        let per_collection = try_join_all(
            collections
                .iter()
                .map(|name| {
                    self.search_collection(name, &vector, config.limit, config.score_threshold)
                }),
        )
        .await?;

        let merged = merge_ranked(per_collection.into_iter().flatten(), config.final_top_k);
        info!(
            collections = collections.len(),
            results = merged.len(),
            "multi-collection query complete"
        );
        Ok(merged)
    }

    /// `None` when the collection does not exist.
    pub async fn query_single(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Option<Vec<ScoredResult>>, SearchError> {
        let query_text = non_empty_query(query_text)?;
        if !self.store.exists(collection).await? {
            info!(collection, "collection does not exist, returning no results");
            return Ok(None);
        }

        let vector = self.embedder.embed(query_text).await?;
        let results = self
            .search_collection(collection, &vector, limit, score_threshold)
            .await?;
        debug!(collection, results = results.len(), "collection query complete");
        Ok(Some(results))
    }

    async fn search_collection(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        // Collections can disappear between listing and querying.
        if !self.store.exists(collection).await? {
            return Ok(Vec::new());
        }

        let points = self
            .store
            .query(collection, vector, limit, score_threshold)
            .await?;

        Ok(points
            .into_iter()
            .map(|point| ScoredResult {
                score: point.score,
                text: point.text,
                collection: collection.to_string(),
            })
            .collect())
    }
}

fn non_empty_query(query_text: &str) -> Result<&str, SearchError> {
    let trimmed = query_text.trim();
    if trimmed.is_empty() {
        return Err(SearchError::Request("query is empty".to_string()));
    }
    Ok(trimmed)
}

/// Stable descending sort by score, then truncation.
pub fn merge_ranked(
    results: impl IntoIterator<Item = ScoredResult>,
    top_k: usize,
) -> Vec<ScoredResult> {
    let mut merged = results.into_iter().collect::<Vec<_>>();
    merged.sort_by(|left, right| right.score.total_cmp(&left.score));
    merged.truncate(top_k);
    merged
}
