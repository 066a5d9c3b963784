use crate::error::EmbeddingError;
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Output size of `all-minilm`, the default Ollama embedding model.
pub const DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "all-minilm";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Offline embedder hashing character trigrams into buckets. Deterministic,
/// so it doubles as the embedder for tests.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Clone)]
pub struct OllamaEmbedderConfig {
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    /// First retry delay; doubles per attempt up to 32 times this value.
    pub retry_base_delay: Duration,
}

impl Default for OllamaEmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_OLLAMA_EMBEDDING_DIMENSIONS,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Embeds through a local Ollama server (`POST /api/embed`).
///
/// HTTP 429, 5xx and connection errors are retried with exponential backoff
/// (1s, 2s, 4s, ... capped at 32s); other client errors fail immediately.
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbedderConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbedderConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = json!({
            "model": self.config.model,
            "input": text,
        });

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * (1u32 << (attempt - 1).min(5));
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(self.endpoint()).json(&body).send().await {
                Ok(response) => response,
                Err(error) => {
                    warn!(endpoint = %self.config.endpoint, error = %error, "ollama embed request failed");
                    last_error = Some(EmbeddingError::Http(error));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: Value = response.json().await?;
                let vector = parse_embed_response(&parsed)?;
                if vector.len() != self.config.dimensions {
                    return Err(EmbeddingError::Dimension {
                        expected: self.config.dimensions,
                        actual: vector.len(),
                    });
                }
                return Ok(vector);
            }

            let details = response.text().await.unwrap_or_default();
            let error = EmbeddingError::BackendResponse {
                status: status.as_u16(),
                details,
            };

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(error);
                continue;
            }

            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| {
            EmbeddingError::InvalidResponse("embedding failed after retries".to_string())
        }))
    }
}

fn parse_embed_response(parsed: &Value) -> Result<Vec<f32>, EmbeddingError> {
    let first = parsed
        .pointer("/embeddings/0")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EmbeddingError::InvalidResponse("missing embeddings array".to_string())
        })?;

    first
        .iter()
        .map(|value| {
            value.as_f64().map(|number| number as f32).ok_or_else(|| {
                EmbeddingError::InvalidResponse("embedding value is not a number".to_string())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Answers one request per canned `(status, body)`, in order, then stops
    /// accepting. Returns the base URL and a request counter.
    async fn canned_ollama(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{address}"), requests)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(read) => buffer.extend_from_slice(&chunk[..read]),
            }
            let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buffer[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + length {
                return;
            }
        }
    }

    fn embedder(endpoint: String, dimensions: usize) -> OllamaEmbedder {
        OllamaEmbedder::new(OllamaEmbedderConfig {
            endpoint,
            dimensions,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(10),
            ..OllamaEmbedderConfig::default()
        })
        .unwrap()
    }

    fn embeddings_body(vector: &[f32]) -> String {
        json!({ "model": "all-minilm", "embeddings": [vector] }).to_string()
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let (endpoint, requests) = canned_ollama(vec![
            (503, "{\"error\":\"loading model\"}".to_string()),
            (429, "{\"error\":\"busy\"}".to_string()),
            (200, embeddings_body(&[0.1, 0.2, 0.3])),
        ])
        .await;

        let vector = embedder(endpoint, 3).embed("pump").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let (endpoint, requests) = canned_ollama(vec![
            (400, "{\"error\":\"bad input\"}".to_string()),
            (200, embeddings_body(&[0.1, 0.2, 0.3])),
        ])
        .await;

        let result = embedder(endpoint, 3).embed("pump").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::BackendResponse { status: 400, .. })
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_stop_after_max_retries() {
        let (endpoint, requests) = canned_ollama(vec![
            (500, "{}".to_string()),
            (500, "{}".to_string()),
            (500, "{}".to_string()),
            (200, embeddings_body(&[0.1, 0.2, 0.3])),
        ])
        .await;

        let result = embedder(endpoint, 3).embed("pump").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::BackendResponse { status: 500, .. })
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wrong_vector_length_is_a_dimension_error() {
        let (endpoint, _) = canned_ollama(vec![(200, embeddings_body(&[0.1, 0.2, 0.3]))]).await;

        let result = embedder(endpoint, 4).embed("pump").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::Dimension {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn connection_errors_are_retried_then_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = embedder(format!("http://{address}"), 3).embed("pump").await;
        assert!(matches!(result, Err(EmbeddingError::Http(_))));
    }

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        let second = embedder.embed("Hydraulic pressure and flow").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await.unwrap();
        assert_eq!(vector.len(), 32);
        assert_eq!(embedder.dimensions(), 32);
    }

    #[test]
    fn ollama_response_is_parsed() {
        let parsed = json!({ "model": "all-minilm", "embeddings": [[0.5, -0.25, 1.0]] });
        let vector = parse_embed_response(&parsed).unwrap();
        assert_eq!(vector, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn ollama_response_without_embeddings_is_rejected() {
        let parsed = json!({ "error": "model not found" });
        assert!(matches!(
            parse_embed_response(&parsed),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }
}
