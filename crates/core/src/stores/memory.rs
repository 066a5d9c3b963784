//! Process-local [`CollectionStore`] scoring by cosine similarity.
//!
//! Collections live in a `BTreeMap` behind a `tokio::sync::RwLock`, so listing
//! is alphabetical and deterministic. Used for offline runs and tests.

use crate::store::{CollectionInfo, Distance, Point, PointId, ScoredPoint};
use crate::traits::CollectionStore;
use crate::SearchError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug)]
struct MemoryCollection {
    dimensions: usize,
    distance: Distance,
    positions: HashMap<PointId, usize>,
    points: Vec<Point>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, MemoryCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every point in `name`, in first-insertion order.
    pub async fn points(&self, name: &str) -> Option<Vec<Point>> {
        let collections = self.collections.read().await;
        collections.get(name).map(|collection| collection.points.clone())
    }
}

fn missing(name: &str) -> SearchError {
    SearchError::BackendResponse {
        backend: "memory".to_string(),
        details: format!("collection '{name}' does not exist"),
    }
}

fn similarity(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        Distance::Euclid => -a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn exists(&self, name: &str) -> Result<bool, SearchError> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), SearchError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(SearchError::BackendResponse {
                backend: "memory".to_string(),
                details: format!("collection '{name}' already exists"),
            });
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimensions,
                distance,
                positions: HashMap::new(),
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), SearchError> {
        self.collections
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| missing(name))
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), SearchError> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        // Validate the whole batch first so a bad point leaves nothing behind.
        if let Some(point) = points
            .iter()
            .find(|point| point.vector.len() != collection.dimensions)
        {
            return Err(SearchError::BackendResponse {
                backend: "memory".to_string(),
                details: format!(
                    "point {} has dimension {}, collection '{name}' expects {}",
                    point.id,
                    point.vector.len(),
                    collection.dimensions
                ),
            });
        }

        for point in points {
            match collection.positions.get(&point.id) {
                Some(&position) => collection.points[position] = point.clone(),
                None => {
                    collection
                        .positions
                        .insert(point.id.clone(), collection.points.len());
                    collection.points.push(point.clone());
                }
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, SearchError> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;

        if vector.len() != collection.dimensions {
            return Err(SearchError::BackendResponse {
                backend: "memory".to_string(),
                details: format!(
                    "query vector dim {} is not {} for collection '{name}'",
                    vector.len(),
                    collection.dimensions
                ),
            });
        }

        let mut scored = collection
            .points
            .iter()
            .map(|point| ScoredPoint {
                id: point.id.clone(),
                score: similarity(collection.distance, &point.vector, vector),
                text: point.payload.text.clone(),
            })
            .filter(|point| point.score >= score_threshold)
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn list_collections(&self) -> Result<Vec<String>, SearchError> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn info(&self, name: &str) -> Result<Option<CollectionInfo>, SearchError> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|collection| CollectionInfo {
            name: name.to_string(),
            points_count: collection.points.len() as u64,
            vector_size: collection.dimensions,
            distance: collection.distance,
        }))
    }
}
