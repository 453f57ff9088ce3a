use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::constants::{CONTENT_TYPE_JSON, LOG_PREFIX_SUCCESS};
use crate::error::RetrievalError;
use crate::http::error::read_error_body;
use crate::http::{EndpointResolver, build_embeddings_request};
use crate::logging::{log_payload, log_timed};
use crate::model::EndpointPair;
use crate::retrieval::collaborators::{Embedder, EmbeddingResponse};

/// Embeddings over an OpenAI-compatible `/v1/embeddings` endpoint, with a
/// TTL cache keyed by model and input text.
pub struct HttpEmbedder {
    resolver: EndpointResolver,
    endpoints: EndpointPair,
    cache: Cache<String, EmbeddingResponse>,
}

impl HttpEmbedder {
    pub fn new(resolver: EndpointResolver, endpoints: EndpointPair, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(cache_ttl)
            .build();

        Self {
            resolver,
            endpoints,
            cache,
        }
    }

    fn cache_key(model: &str, texts: &[String]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        for text in texts {
            hasher.update([0u8]);
            hasher.update(text.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    async fn fetch(
        &self,
        model: &str,
        texts: &[String],
        token: &CancellationToken,
    ) -> Result<EmbeddingResponse, RetrievalError> {
        let body = build_embeddings_request(model, texts);
        log_payload("embeddings", &body);

        let response = self
            .resolver
            .request(&self.endpoints, &body, CONTENT_TYPE_JSON, token)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = read_error_body(response).await;
            return Err(RetrievalError::embedding(&format!(
                "embedding request failed with {}: {}",
                status, body_text
            )));
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(RetrievalError::cancelled()),
            parsed = response.json::<EmbeddingResponse>() => parsed.map_err(|e| {
                RetrievalError::embedding(&format!("invalid embeddings response: {}", e))
            }),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(
        &self,
        model: &str,
        texts: &[String],
        token: &CancellationToken,
    ) -> Result<EmbeddingResponse, RetrievalError> {
        let start_time = Instant::now();
        let key = Self::cache_key(model, texts);

        if let Some(cached) = self.cache.get(&key).await {
            log::debug!("embedding cache hit for '{}'", model);
            return Ok(cached);
        }

        let response = self.fetch(model, texts, token).await?;
        if response.first_vector().is_some_and(|v| !v.is_empty()) {
            self.cache.insert(key, response.clone()).await;
        }

        log_timed(
            LOG_PREFIX_SUCCESS,
            &format!("embedded {} input(s) with '{}'", texts.len(), model),
            start_time,
        );
        Ok(response)
    }
}
