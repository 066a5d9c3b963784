mod server;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    CharacterNgramEmbedder, ChatModel, ChunkingConfig, CollectionStore, Embedder, IngestOptions,
    IngestionPipeline, InMemoryStore, LopdfExtractor, OllamaChat, OllamaChatConfig,
    OllamaEmbedder, OllamaEmbedderConfig, PointIdStrategy, QdrantStore, RagAnswerer,
    RetrievalAggregator, RetrievalConfig, StructureParser, DEFAULT_CHAT_MODEL,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_FINAL_TOP_K, DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS,
    DEFAULT_OLLAMA_EMBEDDING_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_QDRANT_URL, DEFAULT_QUERY_LIMIT,
    DEFAULT_SCORE_THRESHOLD, DEFAULT_UPSERT_BATCH_SIZE,
};
use server::{rag_router, serve, structure_router, RagState, StructureState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = DEFAULT_QDRANT_URL, global = true)]
    qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true, global = true)]
    qdrant_api_key: Option<String>,

    /// Ollama base URL, used for embeddings and chat
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL, global = true)]
    ollama_url: String,

    /// Ollama embedding model
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_OLLAMA_EMBEDDING_MODEL, global = true)]
    embedding_model: String,

    /// Output dimension of the embedding model
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS, global = true)]
    embedding_dimensions: usize,

    /// Ollama chat model
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL, global = true)]
    chat_model: String,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Ollama, global = true)]
    embedder: EmbedderKind,

    /// Vector store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Qdrant, global = true)]
    store: StoreKind,

    /// Timeout in seconds for each embedding or store request
    #[arg(long, default_value = "30", global = true)]
    request_timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Ollama `/api/embed`
    Ollama,
    /// Offline character n-gram hashing
    Ngram,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Qdrant,
    /// Process-local, lost on exit
    Memory,
}

#[derive(Clone, Copy, ValueEnum)]
enum PointIdArg {
    Sequential,
    ContentHash,
    Auto,
}

impl From<PointIdArg> for PointIdStrategy {
    fn from(value: PointIdArg) -> Self {
        match value {
            PointIdArg::Sequential => PointIdStrategy::Sequential,
            PointIdArg::ContentHash => PointIdStrategy::ContentHash,
            PointIdArg::Auto => PointIdStrategy::Auto,
        }
    }
}

#[derive(clap::Args)]
struct ChunkArgs {
    /// Words per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Words shared by consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    overlap: usize,

    /// Points per upsert request
    #[arg(long, default_value_t = DEFAULT_UPSERT_BATCH_SIZE)]
    batch_size: usize,

    /// Keep an existing collection and add to it instead of recreating it
    #[arg(long, default_value_t = false)]
    append: bool,

    /// How point ids are assigned
    #[arg(long, value_enum, default_value_t = PointIdArg::Auto)]
    point_ids: PointIdArg,
}

impl ChunkArgs {
    fn options(&self) -> IngestOptions {
        IngestOptions {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            recreate: !self.append,
            batch_size: self.batch_size,
            point_ids: self.point_ids.into(),
        }
    }
}

#[derive(clap::Args)]
struct RetrievalArgs {
    /// Candidates taken from each collection
    #[arg(long, default_value_t = DEFAULT_QUERY_LIMIT)]
    limit: usize,

    /// Minimum similarity score
    #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD)]
    score_threshold: f32,

    /// Results kept after merging all collections
    #[arg(long, default_value_t = DEFAULT_FINAL_TOP_K)]
    top_k: usize,
}

impl RetrievalArgs {
    fn config(&self) -> RetrievalConfig {
        RetrievalConfig {
            limit: self.limit,
            score_threshold: self.score_threshold,
            final_top_k: self.top_k,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Extract a PDF, chunk it and store its embeddings in a collection.
    Ingest {
        /// PDF file to ingest
        #[arg(long)]
        pdf: PathBuf,
        /// Target collection
        #[arg(long)]
        collection: String,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Retrieve the best passages, optionally from a single collection.
    Query {
        /// Query text
        #[arg(long)]
        query: String,
        /// Only search this collection
        #[arg(long)]
        collection: Option<String>,
        /// Ask the chat model to answer from the retrieved passages
        #[arg(long, default_value_t = false)]
        answer: bool,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Inspect or remove collections.
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Serve the PDF upload and question answering API.
    ServeRag {
        #[arg(long, env = "RAG_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
        /// Collection used by `POST /upload` when none is given
        #[arg(long, default_value = "documents")]
        default_collection: String,
        #[command(flatten)]
        chunking: ChunkArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Serve the folder structure generator API.
    ServeStructure {
        #[arg(long, env = "STRUCTURE_BIND", default_value = "0.0.0.0:5000")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    List,
    Info { name: String },
    Delete { name: String },
}

struct Backends {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CollectionStore>,
}

impl Cli {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn backends(&self) -> anyhow::Result<Backends> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(OllamaEmbedderConfig {
                endpoint: self.ollama_url.clone(),
                model: self.embedding_model.clone(),
                dimensions: self.embedding_dimensions,
                timeout: self.timeout(),
                ..OllamaEmbedderConfig::default()
            })?),
            EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder::default()),
        };

        let store: Arc<dyn CollectionStore> = match self.store {
            StoreKind::Qdrant => {
                if let Some(key) = &self.qdrant_api_key {
                    info!(url = %self.qdrant_url, api_key = %mask_secret(key), "using qdrant");
                } else {
                    info!(url = %self.qdrant_url, "using qdrant without api key");
                }
                Arc::new(QdrantStore::with_timeout(
                    &self.qdrant_url,
                    self.qdrant_api_key.clone(),
                    self.timeout(),
                )?)
            }
            StoreKind::Memory => {
                warn!("using in-memory store, collections are lost on exit");
                Arc::new(InMemoryStore::new())
            }
        };

        info!(dimensions = embedder.dimensions(), "embedder ready");
        Ok(Backends { embedder, store })
    }

    fn chat(&self) -> anyhow::Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(OllamaChat::new(OllamaChatConfig {
            endpoint: self.ollama_url.clone(),
            model: self.chat_model.clone(),
            ..OllamaChatConfig::default()
        })?))
    }
}

fn mask_secret(secret: &str) -> String {
    let chars = secret.chars().collect::<Vec<_>>();
    let visible = (chars.len() / 2).min(4);
    let hidden = chars.len() - visible;
    let tail = chars[hidden..].iter().collect::<String>();
    format!("{}{}", "*".repeat(hidden), tail)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match &cli.command {
        Command::Ingest {
            pdf,
            collection,
            chunking,
        } => {
            let backends = cli.backends()?;
            let pipeline =
                IngestionPipeline::new(Arc::new(LopdfExtractor), backends.embedder, backends.store);
            let report = pipeline.ingest(pdf, collection, &chunking.options()).await?;

            println!(
                "{} chunks uploaded to collection '{}' in {} batch(es) at {}",
                report.chunk_count,
                report.collection,
                report.batches,
                Utc::now().to_rfc3339()
            );
        }
        Command::Query {
            query,
            collection,
            answer,
            retrieval,
        } => {
            let backends = cli.backends()?;
            let config = retrieval.config();
            let aggregator = Arc::new(RetrievalAggregator::new(backends.embedder, backends.store));

            if let Some(collection) = collection {
                match aggregator
                    .query_single(collection, query, config.limit, config.score_threshold)
                    .await?
                {
                    Some(results) => {
                        println!("found {} result(s) in '{collection}':", results.len());
                        for result in results {
                            println!("[{:.4}] {}", result.score, result.text);
                        }
                    }
                    None => {
                        println!("collection '{collection}' doesn't exist, ingest a PDF first")
                    }
                }
            } else if *answer {
                let answerer = RagAnswerer::new(aggregator, cli.chat()?, config);
                let answer = answerer.answer(query).await?;
                println!("{}", answer.answer);
                for (index, source) in answer.sources.iter().enumerate() {
                    println!(
                        "  [{}] {} score={:.4}",
                        index + 1,
                        source.collection,
                        source.score
                    );
                }
            } else {
                let results = aggregator.query_all(query, &config).await?;
                for result in results {
                    println!("[{:.4}] ({}) {}", result.score, result.collection, result.text);
                }
            }
        }
        Command::Collections { action } => {
            let store = cli.backends()?.store;
            match action {
                CollectionAction::List => {
                    for name in store.list_collections().await? {
                        println!("{name}");
                    }
                }
                CollectionAction::Info { name } => match store.info(name).await? {
                    Some(info) => println!(
                        "{}: points={} vector_size={} distance={}",
                        info.name, info.points_count, info.vector_size, info.distance
                    ),
                    None => println!("collection '{name}' doesn't exist"),
                },
                CollectionAction::Delete { name } => {
                    if store.exists(name).await? {
                        store.delete(name).await?;
                        println!("deleted collection '{name}'");
                    } else {
                        println!("collection '{name}' doesn't exist");
                    }
                }
            }
        }
        Command::ServeRag {
            bind,
            default_collection,
            chunking,
            retrieval,
        } => {
            let backends = cli.backends()?;
            let config = retrieval.config();
            let aggregator = Arc::new(RetrievalAggregator::new(
                backends.embedder.clone(),
                backends.store.clone(),
            ));
            let ingest_options = chunking.options();
            ChunkingConfig::new(ingest_options.chunk_size, ingest_options.overlap)?;

            let state = Arc::new(RagState {
                pipeline: IngestionPipeline::new(
                    Arc::new(LopdfExtractor),
                    backends.embedder,
                    backends.store,
                ),
                answerer: RagAnswerer::new(aggregator, cli.chat()?, config),
                default_collection: default_collection.clone(),
                ingest_options,
            });
            serve(rag_router(state), bind, "rag").await?;
        }
        Command::ServeStructure { bind } => {
            let state = Arc::new(StructureState {
                chat: cli.chat()?,
                parser: StructureParser::new()?,
            });
            serve(structure_router(state), bind, "structure").await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_keep_only_last_four_characters() {
        assert_eq!(mask_secret("abcdefgh"), "****efgh");
        assert_eq!(mask_secret("abcdefghijkl"), "********ijkl");
    }

    #[test]
    fn short_secrets_are_at_least_half_masked() {
        assert_eq!(mask_secret("abc"), "**c");
        assert_eq!(mask_secret("abcd"), "**cd");
        assert_eq!(mask_secret("a"), "*");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn cli_parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "pdf-rag",
            "--store",
            "memory",
            "ingest",
            "--pdf",
            "manual.pdf",
            "--collection",
            "manuals",
            "--append",
            "--chunk-size",
            "200",
            "--overlap",
            "20",
        ])
        .unwrap();

        match cli.command {
            Command::Ingest {
                collection,
                chunking,
                ..
            } => {
                let options = chunking.options();
                assert_eq!(collection, "manuals");
                assert!(!options.recreate);
                assert_eq!(options.chunk_size, 200);
                assert_eq!(options.overlap, 20);
                assert_eq!(options.point_ids, PointIdStrategy::Auto);
            }
            _ => panic!("expected ingest command"),
        }
    }
}
