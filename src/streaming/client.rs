use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::constants::{CONTENT_TYPE_SSE, LOG_PREFIX_CONN};
use crate::error::StreamError;
use crate::http::error::read_error_body;
use crate::http::{EndpointResolver, build_completion_request};
use crate::logging::{log_payload, log_request, log_timed};
use crate::model::{CompletionParameters, EndpointPair, Message};
use crate::streaming::sse::{StreamEvent, StreamOutcome, pump_event_stream};

static STREAM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Everything the server needs to produce one completion.
#[derive(Debug, Clone)]
pub struct CompletionPayload {
    pub model: String,
    pub messages: Vec<Message>,
    pub params: CompletionParameters,
}

/// Lazy, finite sequence of text increments ending in one terminal event.
/// Not restartable: once the terminal event is yielded the stream is exhausted.
pub struct CompletionStream {
    inner: UnboundedReceiverStream<StreamEvent>,
    finished: bool,
}

impl CompletionStream {
    fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            finished: false,
        }
    }
}

impl Stream for CompletionStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                // producer vanished without a terminal event
                self.finished = true;
                Poll::Ready(Some(StreamEvent::Failed(StreamError::stream(
                    "completion task ended unexpectedly",
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Streams chat completions from an OpenAI-compatible server.
#[derive(Clone)]
pub struct StreamingCompletionClient {
    resolver: EndpointResolver,
}

impl StreamingCompletionClient {
    pub fn new(resolver: EndpointResolver) -> Self {
        Self { resolver }
    }

    /// Starts the request on a background task and returns its event stream.
    pub fn stream(
        &self,
        endpoints: EndpointPair,
        payload: CompletionPayload,
        cancellation_token: CancellationToken,
    ) -> CompletionStream {
        let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
        let resolver = self.resolver.clone();

        tokio::spawn(async move {
            run_completion(resolver, endpoints, payload, cancellation_token, tx).await;
        });

        CompletionStream::new(rx)
    }
}

async fn run_completion(
    resolver: EndpointResolver,
    endpoints: EndpointPair,
    payload: CompletionPayload,
    cancellation_token: CancellationToken,
    tx: mpsc::UnboundedSender<StreamEvent>,
) {
    let start_time = Instant::now();
    let stream_id = STREAM_COUNTER.fetch_add(1, Ordering::Relaxed) % 1_000_000;

    let body = build_completion_request(&payload.model, &payload.messages, &payload.params);
    log_request("POST", &endpoints.primary, Some(&payload.model));
    log_payload("completion", &body);

    let response = match resolver
        .request(&endpoints, &body, CONTENT_TYPE_SSE, &cancellation_token)
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_cancelled() => {
            let _ = tx.send(StreamEvent::Complete);
            return;
        }
        Err(e) => {
            let _ = tx.send(StreamEvent::Failed(e));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body_text = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string()),
            text = read_error_body(response) => text,
        };
        log::error!("completion failed with status {}", status);
        let _ = tx.send(StreamEvent::Failed(StreamError::http_status(
            status.as_u16(),
            body_text,
        )));
        return;
    }

    if response.content_length() == Some(0) {
        let _ = tx.send(StreamEvent::Failed(StreamError::missing_body()));
        return;
    }

    let (outcome, chunk_count) =
        pump_event_stream(response.bytes_stream(), cancellation_token, &tx).await;

    let label = match outcome {
        StreamOutcome::Cancelled => "cancelled",
        StreamOutcome::Failed => "failed",
        _ => "completed",
    };
    log_timed(
        LOG_PREFIX_CONN,
        &format!("stream [{}] {} | {} chunks", stream_id, label, chunk_count),
        start_time,
    );
}
