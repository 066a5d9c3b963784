use crate::chunking::{ChunkingConfig, WordChunker};
use crate::extractor::{extract_document, PdfExtractor};
use crate::models::{Chunk, ChunkPayload, Document, IngestOptions, PointIdStrategy};
use crate::store::{Distance, Point, PointId};
use crate::traits::{CollectionStore, Embedder};
use crate::IngestError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub collection: String,
    pub chunk_count: usize,
    pub batches: usize,
    pub point_ids: PointIdStrategy,
}

/// Extract, chunk, embed and upload one document into a named collection.
///
/// Points are uploaded in batches of `IngestOptions::batch_size`. A failed
/// batch aborts the run and is returned as the error; batches that were
/// already accepted by the store stay there.
#[derive(Clone)]
pub struct IngestionPipeline {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CollectionStore>,
}

impl IngestionPipeline {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CollectionStore>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CollectionStore> {
        &self.store
    }

    pub async fn ingest(
        &self,
        path: &Path,
        collection: &str,
        options: &IngestOptions,
    ) -> Result<IngestionReport, IngestError> {
        validate_options(collection, options)?;

        if !tokio::fs::try_exists(path).await? {
            return Err(IngestError::NotFound(format!(
                "pdf file not found: {}",
                path.display()
            )));
        }

        info!(path = %path.display(), collection, "processing pdf");

        let extractor = Arc::clone(&self.extractor);
        let owned_path = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || {
            extract_document(extractor.as_ref(), &owned_path)
        })
        .await
        .map_err(|error| IngestError::Extraction(format!("extraction task failed: {error}")))??;

        self.ingest_document(&document, collection, options).await
    }

    /// Same as [`IngestionPipeline::ingest`] for text that is already extracted.
    pub async fn ingest_document(
        &self,
        document: &Document,
        collection: &str,
        options: &IngestOptions,
    ) -> Result<IngestionReport, IngestError> {
        validate_options(collection, options)?;
        let chunker = WordChunker::new(ChunkingConfig {
            chunk_size: options.chunk_size,
            overlap: options.overlap,
        })?;

        info!(
            source = %document.source,
            words = document.text.split_whitespace().count(),
            "extracted document text"
        );

        self.prepare_collection(collection, options.recreate).await?;

        let chunk_count = chunker.chunks(&document.text).count();
        let total_batches = chunk_count.div_ceil(options.batch_size);
        let point_ids = options.point_ids.resolve(options.recreate);
        let pdf_name = document.file_name();
        let ingested_at = Utc::now();

        info!(collection, chunk_count, total_batches, ?point_ids, "created text chunks");

        let mut batch = Vec::with_capacity(options.batch_size.min(chunk_count));
        let mut batches = 0usize;

        for (index, text) in chunker.chunks(&document.text).enumerate() {
            let chunk = Chunk {
                index: index as u64,
                word_count: text.split_whitespace().count(),
                text,
                chunk_size: options.chunk_size,
                overlap: options.overlap,
                source: document.source.clone(),
            };

            let vector = self.embedder.embed(&chunk.text).await?;
            batch.push(Point {
                id: point_id(point_ids, &chunk),
                vector,
                payload: ChunkPayload::from_chunk(&chunk, &pdf_name, ingested_at),
            });

            if batch.len() == options.batch_size {
                batches += 1;
                self.upload_batch(collection, &batch, batches, total_batches)
                    .await?;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            batches += 1;
            self.upload_batch(collection, &batch, batches, total_batches)
                .await?;
        }

        info!(collection, chunk_count, batches, "uploaded all chunks");

        Ok(IngestionReport {
            collection: collection.to_string(),
            chunk_count,
            batches,
            point_ids,
        })
    }

    /// Ensures `name` exists with this pipeline's embedding dimension.
    ///
    /// An existing collection is dropped and recreated when `recreate` is set,
    /// otherwise it is reused as is.
    pub async fn prepare_collection(&self, name: &str, recreate: bool) -> Result<(), IngestError> {
        if self.store.exists(name).await? {
            if !recreate {
                info!(collection = name, "collection already exists, reusing it");
                return Ok(());
            }
            info!(collection = name, "collection already exists, deleting it");
            self.store.delete(name).await?;
        }

        let dimensions = self.embedder.dimensions();
        self.store.create(name, dimensions, Distance::Cosine).await?;
        info!(collection = name, dimensions, "created collection");
        Ok(())
    }

    async fn upload_batch(
        &self,
        collection: &str,
        batch: &[Point],
        number: usize,
        total: usize,
    ) -> Result<(), IngestError> {
        self.store.upsert(collection, batch).await?;
        debug!(collection, batch = number, batches = total, size = batch.len(), "uploaded batch");
        Ok(())
    }
}

fn validate_options(collection: &str, options: &IngestOptions) -> Result<(), IngestError> {
    if collection.trim().is_empty() {
        return Err(IngestError::InvalidArgument(
            "collection name must not be empty".to_string(),
        ));
    }
    if options.batch_size == 0 {
        return Err(IngestError::InvalidArgument(
            "batch size must be greater than zero".to_string(),
        ));
    }
    ChunkingConfig {
        chunk_size: options.chunk_size,
        overlap: options.overlap,
    }
    .validate()
}

fn point_id(strategy: PointIdStrategy, chunk: &Chunk) -> PointId {
    match strategy {
        PointIdStrategy::ContentHash => content_point_id(chunk),
        PointIdStrategy::Sequential | PointIdStrategy::Auto => PointId::Num(chunk.index),
    }
}

fn content_point_id(chunk: &Chunk) -> PointId {
    let mut hasher = Sha256::new();
    hasher.update(chunk.source.as_bytes());
    hasher.update(chunk.index.to_le_bytes());
    hasher.update(chunk.text.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    PointId::Uuid(uuid::Builder::from_custom_bytes(bytes).into_uuid().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::PageText;
    use crate::stores::InMemoryStore;
    use std::fs;
    use tempfile::tempdir;

    struct FixedExtractor {
        pages: Vec<PageText>,
    }

    impl PdfExtractor for FixedExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self.pages.clone())
        }
    }

    struct FailingExtractor;

    impl PdfExtractor for FailingExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Err(IngestError::Extraction("xref table is corrupt".to_string()))
        }
    }

    fn words(count: usize) -> String {
        (0..count)
            .map(|index| format!("term{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn pipeline_with(
        extractor: Arc<dyn PdfExtractor>,
        store: Arc<InMemoryStore>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            extractor,
            Arc::new(CharacterNgramEmbedder { dimensions: 16 }),
            store,
        )
    }

    #[tokio::test]
    async fn ingest_creates_sequential_points() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("manual.pdf");
        fs::write(&path, b"%PDF-1.4")?;

        let store = Arc::new(InMemoryStore::new());
        let extractor = Arc::new(FixedExtractor {
            pages: vec![PageText {
                number: 1,
                text: words(40),
            }],
        });
        let pipeline = pipeline_with(extractor, Arc::clone(&store));

        let options = IngestOptions {
            chunk_size: 10,
            overlap: 2,
            ..IngestOptions::default()
        };
        let report = pipeline.ingest(&path, "manuals", &options).await?;

        // 44 words including the "--- Page 1 ---" marker, stride 8.
        assert_eq!(report.chunk_count, 6);
        assert_eq!(report.batches, 1);
        assert_eq!(report.point_ids, PointIdStrategy::Sequential);

        let points = store.points("manuals").await.unwrap();
        let ids = points.iter().map(|point| point.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, (0..6).map(PointId::Num).collect::<Vec<_>>());
        assert!(points.iter().all(|point| point.vector.len() == 16));
        assert!(points[0].payload.text.starts_with("--- Page 1 --- term0"));
        assert_eq!(points[0].payload.pdf_name, "manual.pdf");
        assert_eq!(points[0].payload.word_count, 10);
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_reported_before_touching_store() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline_with(Arc::new(FailingExtractor), Arc::clone(&store));

        let result = pipeline
            .ingest(Path::new("/no/such/file.pdf"), "manuals", &IngestOptions::default())
            .await;

        assert!(matches!(result, Err(IngestError::NotFound(_))));
        assert!(!store.exists("manuals").await.unwrap());
    }

    #[tokio::test]
    async fn extraction_failure_creates_no_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4")?;

        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline_with(Arc::new(FailingExtractor), Arc::clone(&store));
        let result = pipeline
            .ingest(&path, "manuals", &IngestOptions::default())
            .await;

        assert!(matches!(result, Err(IngestError::Extraction(_))));
        assert!(!store.exists("manuals").await?);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_overlap_is_rejected_before_processing() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline_with(Arc::new(FailingExtractor), Arc::clone(&store));
        let options = IngestOptions {
            chunk_size: 50,
            overlap: 50,
            ..IngestOptions::default()
        };

        let result = pipeline
            .ingest_document(&Document::new("a.pdf", words(10)), "manuals", &options)
            .await;

        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
        assert!(!store.exists("manuals").await.unwrap());
    }

    #[tokio::test]
    async fn recreate_discards_previous_points() -> Result<(), IngestError> {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline_with(Arc::new(FailingExtractor), Arc::clone(&store));
        let options = IngestOptions {
            chunk_size: 10,
            overlap: 0,
            ..IngestOptions::default()
        };

        pipeline
            .ingest_document(&Document::new("a.pdf", words(30)), "docs", &options)
            .await?;
        pipeline
            .ingest_document(&Document::new("b.pdf", words(10)), "docs", &options)
            .await?;

        let info = store.info("docs").await?.unwrap();
        assert_eq!(info.points_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn appending_uses_content_hash_ids() -> Result<(), IngestError> {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline_with(Arc::new(FailingExtractor), Arc::clone(&store));
        let append = IngestOptions {
            chunk_size: 10,
            overlap: 0,
            recreate: false,
            ..IngestOptions::default()
        };

        pipeline
            .ingest_document(&Document::new("a.pdf", words(20)), "docs", &append)
            .await?;
        let report = pipeline
            .ingest_document(&Document::new("b.pdf", words(20)), "docs", &append)
            .await?;
        assert_eq!(report.point_ids, PointIdStrategy::ContentHash);
        assert_eq!(store.info("docs").await?.unwrap().points_count, 4);

        // Same document again overwrites its own points.
        pipeline
            .ingest_document(&Document::new("b.pdf", words(20)), "docs", &append)
            .await?;
        assert_eq!(store.info("docs").await?.unwrap().points_count, 4);
        Ok(())
    }

    #[tokio::test]
    async fn sequential_ids_collide_when_appending() -> Result<(), IngestError> {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline_with(Arc::new(FailingExtractor), Arc::clone(&store));
        let append = IngestOptions {
            chunk_size: 10,
            overlap: 0,
            recreate: false,
            point_ids: PointIdStrategy::Sequential,
            ..IngestOptions::default()
        };

        pipeline
            .ingest_document(&Document::new("a.pdf", words(20)), "docs", &append)
            .await?;
        pipeline
            .ingest_document(&Document::new("b.pdf", words(20)), "docs", &append)
            .await?;

        assert_eq!(store.info("docs").await?.unwrap().points_count, 2);
        Ok(())
    }

    #[test]
    fn content_ids_are_stable_uuids() {
        let chunk = Chunk {
            index: 3,
            text: "pressure relief valve".to_string(),
            word_count: 3,
            chunk_size: 500,
            overlap: 50,
            source: "/docs/a.pdf".to_string(),
        };

        let first = content_point_id(&chunk);
        assert_eq!(first, content_point_id(&chunk));
        match first {
            PointId::Uuid(id) => assert!(uuid::Uuid::parse_str(&id).is_ok()),
            PointId::Num(_) => panic!("expected a uuid id"),
        }
    }
}
