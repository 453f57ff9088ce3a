use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::check_cancelled;
use crate::constants::ERROR_EMPTY_EMBEDDING;
use crate::error::RetrievalError;
use crate::model::{Message, RetrievedChunk};
use crate::prompt::PromptAugmenter;
use crate::retrieval::collaborators::{Embedder, VectorIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub threshold: f32,
    pub source_filter: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    pub messages: Vec<Message>,
    pub embedding_time_ms: u64,
    pub search_time_ms: u64,
}

impl RetrievalResult {
    fn ungrounded(system_prompt: &str, user_prompt: &str, embedding_time_ms: u64) -> Self {
        Self {
            chunks: Vec::new(),
            messages: PromptAugmenter::build(system_prompt, user_prompt, &[]),
            embedding_time_ms,
            search_time_ms: 0,
        }
    }
}

/// Embeds the user prompt, searches the index, and builds grounded messages.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl RetrievalCoordinator {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// `top_k` and `threshold` are forwarded to the index as given.
    pub async fn retrieve(
        &self,
        user_prompt: &str,
        system_prompt: &str,
        embed_model: &str,
        options: &RetrievalOptions,
        token: &CancellationToken,
    ) -> Result<RetrievalResult, RetrievalError> {
        check_cancelled!(token, RetrievalError::cancelled());

        let corpus_size = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RetrievalError::cancelled()),
            count = self.index.count() => count?,
        };
        if corpus_size == 0 {
            log::debug!("knowledge base is empty, skipping retrieval");
            return Ok(RetrievalResult::ungrounded(system_prompt, user_prompt, 0));
        }

        let embedding_start = Instant::now();
        let texts = [user_prompt.to_string()];
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RetrievalError::cancelled()),
            response = self.embedder.embed(embed_model, &texts, token) => response?,
        };
        let embedding_time_ms = embedding_start.elapsed().as_millis() as u64;

        let vector = match response.first_vector() {
            Some(v) if !v.is_empty() => v.to_vec(),
            _ => {
                log::debug!("{}, continuing without context", ERROR_EMPTY_EMBEDDING);
                return Ok(RetrievalResult::ungrounded(
                    system_prompt,
                    user_prompt,
                    embedding_time_ms,
                ));
            }
        };

        let search_start = Instant::now();
        let chunks = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RetrievalError::cancelled()),
            result = self.index.search(
                &vector,
                options.top_k,
                options.threshold,
                options.source_filter.as_deref(),
            ) => result?,
        };
        let search_time_ms = search_start.elapsed().as_millis() as u64;

        log::debug!(
            "retrieved {} chunks (embed {}ms, search {}ms)",
            chunks.len(),
            embedding_time_ms,
            search_time_ms
        );

        let messages = PromptAugmenter::build(system_prompt, user_prompt, &chunks);
        Ok(RetrievalResult {
            chunks,
            messages,
            embedding_time_ms,
            search_time_ms,
        })
    }
}
