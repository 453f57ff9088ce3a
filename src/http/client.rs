use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::check_cancelled;
use crate::constants::CONTENT_TYPE_JSON;
use crate::error::StreamError;
use crate::http::error::map_reqwest_error;
use crate::logging::sanitize_log_message;
use crate::model::EndpointPair;

/// Issues POST requests against a primary URL with one fallback hop on
/// connection-level failure.
#[derive(Clone)]
pub struct EndpointResolver {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl EndpointResolver {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// Sends `body` to `endpoints.primary`, retrying once against the
    /// fallback when the primary fails at the transport level.
    ///
    /// HTTP error statuses come back as `Ok(response)`; only transport
    /// failures qualify for the fallback, and never after cancellation.
    pub async fn request<B: Serialize>(
        &self,
        endpoints: &EndpointPair,
        body: &B,
        accept: &str,
        token: &CancellationToken,
    ) -> Result<reqwest::Response, StreamError> {
        check_cancelled!(token);

        match self.send_once(&endpoints.primary, body, accept, token).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_transport() && !token.is_cancelled() => {
                let Some(fallback) = endpoints.effective_fallback() else {
                    return Err(err);
                };
                log::warn!(
                    "primary {} unreachable, retrying via {}",
                    sanitize_log_message(&endpoints.primary),
                    sanitize_log_message(fallback)
                );
                self.send_once(fallback, body, accept, token).await
            }
            Err(err) => Err(err),
        }
    }

    async fn send_once<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        accept: &str,
        token: &CancellationToken,
    ) -> Result<reqwest::Response, StreamError> {
        let mut request_builder = self
            .client
            .post(url)
            .header("Content-Type", CONTENT_TYPE_JSON)
            .header("Accept", accept)
            .json(body);

        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(StreamError::cancelled()),
            result = request_builder.send() => result.map_err(map_reqwest_error),
        }
    }
}
