use crate::constants::ERROR_SERVER_UNAVAILABLE;
use crate::error::StreamError;

/// Classifies a reqwest failure. Connection-level failures become
/// `StreamError::transport` and are eligible for the fallback hop.
pub fn map_reqwest_error(err: reqwest::Error) -> StreamError {
    if err.is_connect() {
        log::warn!("{}: {}", ERROR_SERVER_UNAVAILABLE, err);
        StreamError::transport(&format!("{}: {}", ERROR_SERVER_UNAVAILABLE, err))
    } else if err.is_timeout() || err.is_request() {
        log::warn!("transport failure: {}", err);
        StreamError::transport(&format!("transport failure: {}", err))
    } else if err.is_builder() {
        StreamError::invalid_request(&format!("invalid request: {}", err))
    } else {
        log::error!("HTTP request failed: {}", err);
        StreamError::stream(&format!("request failed: {}", err))
    }
}

/// Reads a non-2xx body for diagnostics, falling back to the status text.
pub async fn read_error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) if !text.trim().is_empty() => text,
        _ => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()),
    }
}
