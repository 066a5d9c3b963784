use crate::models::ScoredResult;
use crate::prompts::answer_prompt;
use crate::retrieval::{RetrievalAggregator, RetrievalConfig};
use crate::traits::ChatModel;
use crate::SearchError;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub const NO_CONTEXT_ANSWER: &str =
    "I could not find anything relevant in the ingested documents.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ScoredResult>,
}

/// Retrieves passages from every collection and asks the chat model to answer
/// from them.
pub struct RagAnswerer {
    retrieval: Arc<RetrievalAggregator>,
    chat: Arc<dyn ChatModel>,
    config: RetrievalConfig,
}

impl RagAnswerer {
    pub fn new(
        retrieval: Arc<RetrievalAggregator>,
        chat: Arc<dyn ChatModel>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            retrieval,
            chat,
            config,
        }
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, SearchError> {
        let sources = self
            .retrieval
            .query_all(question, &self.config)
            .await?;

        if sources.is_empty() {
            info!("no passages above threshold, skipping generation");
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
            });
        }

        let prompt = answer_prompt(question, &sources);
        let answer = self.chat.complete(None, &prompt).await?;
        info!(sources = sources.len(), "generated answer");

        Ok(Answer {
            answer: answer.trim().to_string(),
            sources,
        })
    }
}
