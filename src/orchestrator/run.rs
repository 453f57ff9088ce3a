use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::constants::{LOG_PREFIX_ERROR, LOG_PREFIX_SUCCESS, LOG_PREFIX_WARNING};
use crate::logging::log_timed;
use crate::model::{CompletionParameters, EndpointPair, Message};
use crate::orchestrator::record::{RagRunConfig, RecordContext, RunRecord};
use crate::prompt::PromptAugmenter;
use crate::retrieval::{RetrievalCoordinator, RetrievalOptions};
use crate::storage::HistorySink;
use crate::streaming::{CompletionPayload, StreamEvent, StreamingCompletionClient};

/// Lifecycle of one run. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RetrievingContext,
    BuildingPrompt,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    pub embed_model: String,
    pub options: RetrievalOptions,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub params: CompletionParameters,
    /// `Some` requests the RAG path.
    pub rag: Option<RagSettings>,
}

/// What the caller observes. Exactly one terminal event ends every run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Chunk(String),
    Completed { output: String, record: RunRecord },
    Failed { message: String, record: RunRecord },
    Cancelled,
}

/// Handle to a running generation.
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    state: watch::Receiver<RunState>,
    token: CancellationToken,
}

impl RunHandle {
    /// Signals the run's cancellation token. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Next event, or `None` once the terminal event has been consumed.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Drains the run, returning the terminal event.
    pub async fn finish(mut self) -> RunEvent {
        let mut terminal = RunEvent::Cancelled;
        while let Some(event) = self.events.recv().await {
            if !matches!(event, RunEvent::Chunk(_)) {
                terminal = event;
            }
        }
        terminal
    }
}

/// Drives retrieval, prompt assembly, and streaming for each run.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    client: StreamingCompletionClient,
    endpoints: EndpointPair,
    retrieval: Option<RetrievalCoordinator>,
    history: Arc<dyn HistorySink>,
    pending_records: TaskTracker,
}

impl GenerationOrchestrator {
    pub fn new(
        client: StreamingCompletionClient,
        endpoints: EndpointPair,
        retrieval: Option<RetrievalCoordinator>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            client,
            endpoints,
            retrieval,
            history,
            pending_records: TaskTracker::new(),
        }
    }

    /// Waits for in-flight history writes. Runs never wait on these; call this
    /// before shutting the runtime down.
    pub async fn flush_history(&self) {
        self.pending_records.close();
        self.pending_records.wait().await;
        self.pending_records.reopen();
    }

    /// Starts a run with a fresh token and output buffer.
    pub fn run(&self, request: GenerationRequest) -> RunHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let token = CancellationToken::new();

        let orchestrator = self.clone();
        let run_token = token.clone();
        tokio::spawn(async move {
            orchestrator
                .drive(request, run_token, events_tx, state_tx)
                .await;
        });

        RunHandle {
            events: events_rx,
            state: state_rx,
            token,
        }
    }

    async fn drive(
        self,
        request: GenerationRequest,
        token: CancellationToken,
        events: mpsc::UnboundedSender<RunEvent>,
        state: watch::Sender<RunState>,
    ) {
        let start_time = Instant::now();

        let rag_path = match (&request.rag, &self.retrieval) {
            (Some(rag), Some(coordinator)) if !rag.embed_model.trim().is_empty() => {
                Some((rag, coordinator))
            }
            _ => None,
        };

        let (messages, rag_config) = match rag_path {
            Some((rag, coordinator)) => {
                let _ = state.send_replace(RunState::RetrievingContext);
                match coordinator
                    .retrieve(
                        &request.user_prompt,
                        &request.system_prompt,
                        &rag.embed_model,
                        &rag.options,
                        &token,
                    )
                    .await
                {
                    Ok(result) => {
                        let rag_config = RagRunConfig {
                            embed_model: rag.embed_model.clone(),
                            top_k: rag.options.top_k,
                            threshold: rag.options.threshold,
                            source_filter: rag.options.source_filter.clone(),
                            chunks_used: result.chunks.len(),
                            embedding_time_ms: result.embedding_time_ms,
                            search_time_ms: result.search_time_ms,
                        };
                        (result.messages, Some(rag_config))
                    }
                    Err(e) if e.is_cancelled() => {
                        let _ = state.send_replace(RunState::Cancelled);
                        log_timed(LOG_PREFIX_WARNING, "run cancelled during retrieval", start_time);
                        let _ = events.send(RunEvent::Cancelled);
                        return;
                    }
                    Err(e) => {
                        log::debug!("retrieval unavailable: {}", e);
                        (ungrounded_messages(&request), None)
                    }
                }
            }
            None => {
                let _ = state.send_replace(RunState::BuildingPrompt);
                (ungrounded_messages(&request), None)
            }
        };

        let _ = state.send_replace(RunState::Streaming);
        let payload = CompletionPayload {
            model: request.model.clone(),
            messages: messages.clone(),
            params: request.params.clone(),
        };
        let mut stream = self
            .client
            .stream(self.endpoints.clone(), payload, token.clone());

        let mut output = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Chunk(text) => {
                    output.push_str(&text);
                    let _ = events.send(RunEvent::Chunk(text));
                }
                StreamEvent::Complete => {
                    let _ = state.send_replace(RunState::Completed);
                    let record = RunRecord::success(
                        record_context(&request, &messages, rag_config, start_time),
                        &output,
                    );
                    self.dispatch_record(record.clone());
                    log_timed(
                        LOG_PREFIX_SUCCESS,
                        &format!("run completed ({} chars)", output.chars().count()),
                        start_time,
                    );
                    let _ = events.send(RunEvent::Completed { output, record });
                    return;
                }
                StreamEvent::Failed(e) => {
                    let _ = state.send_replace(RunState::Failed);
                    let record = RunRecord::error(
                        record_context(&request, &messages, rag_config, start_time),
                        &e.message,
                        &output,
                    );
                    self.dispatch_record(record.clone());
                    log_timed(LOG_PREFIX_ERROR, &format!("run failed: {}", e), start_time);
                    let _ = events.send(RunEvent::Failed {
                        message: e.message,
                        record,
                    });
                    return;
                }
            }
        }
    }

    fn dispatch_record(&self, record: RunRecord) {
        let history = self.history.clone();
        self.pending_records.spawn(async move {
            history.record(record).await;
        });
    }
}

fn ungrounded_messages(request: &GenerationRequest) -> Vec<Message> {
    PromptAugmenter::build(&request.system_prompt, &request.user_prompt, &[])
}

fn record_context<'a>(
    request: &'a GenerationRequest,
    messages: &'a [Message],
    rag_config: Option<RagRunConfig>,
    start_time: Instant,
) -> RecordContext<'a> {
    RecordContext {
        model: &request.model,
        user_prompt: &request.user_prompt,
        messages,
        params: &request.params,
        rag_config,
        duration_ms: start_time.elapsed().as_millis() as u64,
    }
}
