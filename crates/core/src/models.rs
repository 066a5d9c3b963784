use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A source document and the full text extracted from it. Only lives for the
/// duration of one ingestion call.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }

    /// Final path component of the source, or the whole source when it has none.
    pub fn file_name(&self) -> String {
        Path::new(&self.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.source)
            .to_string()
    }
}

/// A word-bounded span of a document plus the settings it was cut with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u64,
    pub text: String,
    pub word_count: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub source: String,
}

/// Payload stored next to every vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkPayload {
    pub text: String,
    pub chunk_id: u64,
    pub source: String,
    pub pdf_name: String,
    pub word_count: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub ingested_at: DateTime<Utc>,
}

impl ChunkPayload {
    pub fn from_chunk(chunk: &Chunk, pdf_name: &str, ingested_at: DateTime<Utc>) -> Self {
        Self {
            text: chunk.text.clone(),
            chunk_id: chunk.index,
            source: chunk.source.clone(),
            pdf_name: pdf_name.to_string(),
            word_count: chunk.word_count,
            chunk_size: chunk.chunk_size,
            overlap: chunk.overlap,
            ingested_at,
        }
    }
}

/// One retrieved passage. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResult {
    pub score: f32,
    pub text: String,
    pub collection: String,
}

/// How point ids are assigned during ingestion.
///
/// `Sequential` numbers points `0..K` in chunk order, which collides with
/// existing points when appending to a collection that was not recreated.
/// `ContentHash` derives a UUID from the source, chunk index and text, so
/// repeated ingestions of different documents never overwrite each other and
/// re-ingesting the same document is idempotent. `Auto` picks `Sequential`
/// when the collection is recreated and `ContentHash` otherwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PointIdStrategy {
    Sequential,
    ContentHash,
    #[default]
    Auto,
}

impl PointIdStrategy {
    pub fn resolve(self, recreate: bool) -> Self {
        match self {
            Self::Auto if recreate => Self::Sequential,
            Self::Auto => Self::ContentHash,
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub recreate: bool,
    pub batch_size: usize,
    pub point_ids: PointIdStrategy,
}

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            recreate: true,
            batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            point_ids: PointIdStrategy::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_strategy_follows_recreate_flag() {
        assert_eq!(PointIdStrategy::Auto.resolve(true), PointIdStrategy::Sequential);
        assert_eq!(PointIdStrategy::Auto.resolve(false), PointIdStrategy::ContentHash);
        assert_eq!(
            PointIdStrategy::Sequential.resolve(false),
            PointIdStrategy::Sequential
        );
    }

    #[test]
    fn document_file_name_strips_directories() {
        let document = Document::new("/srv/manuals/redis.pdf", "");
        assert_eq!(document.file_name(), "redis.pdf");
    }
}
