//! HTTP surface for the two services.
//!
//! | Service   | Method   | Path                    |
//! |-----------|----------|-------------------------|
//! | rag       | `POST`   | `/upload`               |
//! | rag       | `POST`   | `/query`                |
//! | rag       | `GET`    | `/collections`          |
//! | rag       | `GET`    | `/collections/{name}`   |
//! | rag       | `DELETE` | `/collections/{name}`   |
//! | structure | `POST`   | `/generate-structure`   |
//! | both      | `GET`    | `/health`, `/`          |
//!
//! Failures are returned as `{ "success": false, "error": "<message>" }`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_rag_core::{
    folder_structure_prompt, ChatModel, CollectionStore, IngestError, IngestOptions,
    IngestionPipeline, RagAnswerer, SearchError, StructureParser,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct RagState {
    pub pipeline: IngestionPipeline,
    pub answerer: RagAnswerer,
    pub default_collection: String,
    pub ingest_options: IngestOptions,
}

pub struct StructureState {
    pub chat: Arc<dyn ChatModel>,
    pub parser: StructureParser,
}

pub fn rag_router(state: Arc<RagState>) -> Router {
    Router::new()
        .route("/", get(rag_home))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/query", post(query))
        .route("/collections", get(list_collections))
        .route(
            "/collections/{name}",
            get(collection_info).delete(delete_collection),
        )
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn structure_router(state: Arc<StructureState>) -> Router {
    Router::new()
        .route("/", get(structure_home))
        .route("/health", get(health))
        .route("/generate-structure", post(generate_structure))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `router` on `bind` until Ctrl-C.
pub async fn serve(router: Router, bind: &str, service: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(service, address = %listener.local_addr()?, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!(%error, "failed to install ctrl-c handler");
            }
        })
        .await?;
    info!(service, "shut down");
    Ok(())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(error: IngestError) -> Self {
        let status = match &error {
            IngestError::InvalidChunkConfig(_) | IngestError::InvalidArgument(_) => {
                StatusCode::BAD_REQUEST
            }
            IngestError::NotFound(_) => StatusCode::NOT_FOUND,
            IngestError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Embedding(_) | IngestError::Store(_) => StatusCode::BAD_GATEWAY,
        };
        error!(%error, "ingestion failed");
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(error: SearchError) -> Self {
        let status = match &error {
            SearchError::Request(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        error!(%error, "request failed");
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn rag_home(State(state): State<Arc<RagState>>) -> Json<Value> {
    Json(json!({
        "message": "PDF retrieval-augmented answering API",
        "default_collection": state.default_collection,
        "endpoints": {
            "POST /upload": { "body": { "pdf_path": "/path/to/file.pdf", "collection": "optional" } },
            "POST /query": { "body": { "query": "Your question" } },
            "GET /collections": {},
            "GET /collections/{name}": {},
            "DELETE /collections/{name}": {},
            "GET /health": {},
        }
    }))
}

async fn structure_home() -> Json<Value> {
    Json(json!({
        "message": "Folder Structure Generator API",
        "usage": {
            "endpoint": "/generate-structure",
            "method": "POST",
            "body": {
                "prompt": "Your project description",
                "model": "llama3.2 (optional)",
            }
        },
        "example": {
            "request": {
                "prompt": "Create a Python Flask API with authentication",
                "model": "llama3.2",
            },
            "response_format": [
                { "type": "directory", "name": "backend", "children": [
                    { "type": "file", "name": "app.py" },
                    { "type": "file", "name": "requirements.txt" },
                ]}
            ]
        }
    }))
}

#[derive(Debug, Deserialize)]
struct UploadRequest {
    pdf_path: Option<String>,
    collection: Option<String>,
}

async fn upload(
    State(state): State<Arc<RagState>>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let pdf_path = request
        .pdf_path
        .filter(|path| !path.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Missing pdf_path in request body"))?;
    let collection = request
        .collection
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| state.default_collection.clone());

    let report = state
        .pipeline
        .ingest(&PathBuf::from(&pdf_path), &collection, &state.ingest_options)
        .await?;

    Ok(Json(json!({
        "success": true,
        "collection": report.collection,
        "chunks": report.chunk_count,
        "batches": report.batches,
        "point_ids": report.point_ids,
    })))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: Option<String>,
}

async fn query(
    State(state): State<Arc<RagState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let question = request
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Missing query in request body"))?;

    let answer = state.answerer.answer(&question).await?;
    Ok(Json(json!({
        "success": true,
        "answer": answer.answer,
        "sources": answer.sources,
    })))
}

async fn list_collections(State(state): State<Arc<RagState>>) -> Result<Json<Value>, AppError> {
    let collections = state.pipeline.store().list_collections().await?;
    Ok(Json(json!({ "success": true, "collections": collections })))
}

async fn collection_info(
    State(state): State<Arc<RagState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    let info = state
        .pipeline
        .store()
        .info(&name)
        .await?
        .ok_or_else(|| AppError::not_found(format!("collection '{name}' doesn't exist")))?;
    Ok(Json(json!({ "success": true, "collection": info })))
}

async fn delete_collection(
    State(state): State<Arc<RagState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    let store = state.pipeline.store();
    let deleted = if store.exists(&name).await? {
        store.delete(&name).await?;
        info!(collection = %name, "deleted collection");
        true
    } else {
        false
    };
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
struct GenerateStructureRequest {
    prompt: Option<String>,
    model: Option<String>,
}

async fn generate_structure(
    State(state): State<Arc<StructureState>>,
    payload: Result<Json<GenerateStructureRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let prompt = request
        .prompt
        .filter(|prompt| !prompt.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("Missing prompt in request body"))?;

    let raw_response = state
        .chat
        .complete(request.model.as_deref(), &folder_structure_prompt(&prompt))
        .await?;
    let structure = state.parser.parse(&raw_response);

    Ok(Json(json!({
        "success": true,
        "structure": structure,
        "raw_response": raw_response,
    })))
}
