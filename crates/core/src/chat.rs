use crate::traits::ChatModel;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";

#[derive(Debug, Clone)]
pub struct OllamaChatConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaChatConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::embeddings::DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Single-turn, non-streaming chat against Ollama's `POST /api/chat`.
pub struct OllamaChat {
    client: Client,
    config: OllamaChatConfig,
}

impl OllamaChat {
    pub fn new(config: OllamaChatConfig) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    async fn complete(&self, model: Option<&str>, prompt: &str) -> Result<String, SearchError> {
        let model = model
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.config.model.as_str());

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .client
            .post(format!(
                "{}/api/chat",
                self.config.endpoint.trim_end_matches('/')
            ))
            .json(&request)
            .send()
            .await
            .map_err(|error| SearchError::Generation(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Generation(format!(
                "ollama returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| SearchError::Generation(error.to_string()))?;
        let content = parsed
            .message
            .map(|message| message.content)
            .ok_or_else(|| SearchError::Generation("response has no message".to_string()))?;

        debug!(model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_single_user_message_without_streaming() {
        let request = ChatRequest {
            model: "llama3.2",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            stream: false,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "llama3.2",
                "messages": [{ "role": "user", "content": "hello" }],
                "stream": false
            })
        );
    }

    #[test]
    fn response_content_is_extracted() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"src/main.rs"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(parsed.message.unwrap().content, "src/main.rs");
    }
}
