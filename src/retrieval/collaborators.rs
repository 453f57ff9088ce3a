use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RetrievalError;
use crate::model::RetrievedChunk;

/// One vector in an embeddings response (`data[i].embedding`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingData {
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// OpenAI-shaped embeddings response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub data: Vec<EmbeddingData>,
}

impl EmbeddingResponse {
    pub fn first_vector(&self) -> Option<&[f32]> {
        self.data.first().map(|d| d.embedding.as_slice())
    }
}

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Must return `RetrievalError::cancelled()` when `token` fires mid-call.
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        token: &CancellationToken,
    ) -> Result<EmbeddingResponse, RetrievalError>;
}

/// Nearest-neighbour search over the knowledge base.
///
/// `search` results are expected sorted by descending similarity, filtered by
/// `threshold` and `source_filter`, and truncated to `top_k`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn count(&self) -> Result<usize, RetrievalError>;

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
        source_filter: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}
