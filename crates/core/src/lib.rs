pub mod answer;
pub mod chat;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod prompts;
pub mod retrieval;
pub mod store;
pub mod stores;
pub mod structure;
pub mod traits;

pub use answer::{Answer, RagAnswerer, NO_CONTEXT_ANSWER};
pub use chat::{OllamaChat, OllamaChatConfig, DEFAULT_CHAT_MODEL};
pub use chunking::{ChunkingConfig, WordChunker, WordChunks};
pub use embeddings::{
    CharacterNgramEmbedder, OllamaEmbedder, OllamaEmbedderConfig, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS, DEFAULT_OLLAMA_EMBEDDING_MODEL, DEFAULT_OLLAMA_URL,
};
pub use error::{EmbeddingError, IngestError, SearchError};
pub use extractor::{extract_document, extract_page_texts, join_pages, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{IngestionPipeline, IngestionReport};
pub use models::{
    Chunk, ChunkPayload, Document, IngestOptions, PointIdStrategy, ScoredResult,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_UPSERT_BATCH_SIZE,
};
pub use prompts::{answer_prompt, folder_structure_prompt};
pub use retrieval::{
    merge_ranked, RetrievalAggregator, RetrievalConfig, DEFAULT_FINAL_TOP_K, DEFAULT_QUERY_LIMIT,
    DEFAULT_SCORE_THRESHOLD,
};
pub use store::{CollectionInfo, Distance, Point, PointId, ScoredPoint};
pub use stores::{InMemoryStore, QdrantStore, DEFAULT_QDRANT_URL};
pub use structure::{Node, StructureParser};
pub use traits::{ChatModel, CollectionStore, Embedder};
