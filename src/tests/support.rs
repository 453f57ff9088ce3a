use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::RetrievalError;
use crate::http::EndpointResolver;
use crate::model::{EndpointPair, RetrievedChunk};
use crate::orchestrator::RunRecord;
use crate::retrieval::{EmbeddingData, EmbeddingResponse, Embedder, VectorIndex};
use crate::storage::HistorySink;
use crate::streaming::StreamingCompletionClient;

pub fn delta_line(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}

/// A one-shot SSE server. Writes `head` frames, then waits for `release`
/// before writing `tail` frames and closing.
pub struct SseServer {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
    pub release: Arc<Notify>,
}

pub async fn spawn_sse_server(head: Vec<String>, tail: Vec<String>) -> SseServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let addr = listener.local_addr().expect("local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    let hits_for_task = hits.clone();
    let release_for_task = release.clone();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        hits_for_task.fetch_add(1, Ordering::SeqCst);
        let mut buf = [0u8; 8192];
        let _ = socket.read(&mut buf).await;

        let header = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        if socket.write_all(header.as_bytes()).await.is_err() {
            return;
        }
        for frame in head {
            if write_chunk(&mut socket, &frame).await.is_err() {
                return;
            }
        }
        if !tail.is_empty() {
            release_for_task.notified().await;
            for frame in tail {
                if write_chunk(&mut socket, &frame).await.is_err() {
                    return;
                }
            }
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    });

    SseServer {
        url: format!("http://{}/v1/chat/completions", addr),
        hits,
        release,
    }
}

async fn write_chunk(socket: &mut tokio::net::TcpStream, frame: &str) -> std::io::Result<()> {
    let chunk = format!("{:x}\r\n{}\r\n", frame.len(), frame);
    socket.write_all(chunk.as_bytes()).await?;
    socket.flush().await
}

/// Answers every connection with `status` and a plain-text body.
pub async fn spawn_status_server(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    format!("http://{}/v1/chat/completions", addr)
}

/// Writes `response` verbatim to every connection, then closes it.
pub async fn spawn_raw_server(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}/v1/chat/completions", addr)
}

pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}/v1/chat/completions", addr)
}

pub fn client() -> StreamingCompletionClient {
    StreamingCompletionClient::new(EndpointResolver::new(reqwest::Client::new(), None))
}

pub fn endpoints(url: &str) -> EndpointPair {
    EndpointPair::new(url, None)
}

/// Embedder returning a fixed vector, optionally blocking until cancelled.
pub struct StubEmbedder {
    pub vector: Vec<f32>,
    pub block_until_cancelled: bool,
    pub hang: bool,
    pub fail: bool,
    pub seen_texts: Mutex<Vec<String>>,
}

impl StubEmbedder {
    pub fn returning(vector: Vec<f32>) -> Self {
        Self {
            vector,
            block_until_cancelled: false,
            hang: false,
            fail: false,
            seen_texts: Mutex::new(Vec::new()),
        }
    }

    pub fn blocking() -> Self {
        Self {
            block_until_cancelled: true,
            ..Self::returning(vec![1.0])
        }
    }

    /// Never returns and never looks at the token.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::returning(vec![1.0])
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(vec![1.0])
        }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(
        &self,
        _model: &str,
        texts: &[String],
        token: &CancellationToken,
    ) -> Result<EmbeddingResponse, RetrievalError> {
        self.seen_texts.lock().await.extend(texts.iter().cloned());
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.block_until_cancelled {
            token.cancelled().await;
            return Err(RetrievalError::cancelled());
        }
        if self.fail {
            return Err(RetrievalError::embedding("embedding backend exploded"));
        }
        Ok(EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: self.vector.clone(),
            }],
        })
    }
}

/// Index with a fixed size and canned hits; records search calls.
pub struct StubIndex {
    pub size: usize,
    pub hits: Vec<RetrievedChunk>,
    pub searches: AtomicUsize,
    pub last_args: Mutex<Option<(usize, f32, Option<Vec<String>>)>>,
}

impl StubIndex {
    pub fn new(size: usize, hits: Vec<RetrievedChunk>) -> Self {
        Self {
            size,
            hits,
            searches: AtomicUsize::new(0),
            last_args: Mutex::new(None),
        }
    }
}

#[async_trait]
impl VectorIndex for StubIndex {
    async fn count(&self) -> Result<usize, RetrievalError> {
        Ok(self.size)
    }

    async fn search(
        &self,
        _vector: &[f32],
        top_k: usize,
        threshold: f32,
        source_filter: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().await = Some((top_k, threshold, source_filter.map(<[String]>::to_vec)));
        Ok(self.hits.clone())
    }
}

/// History sink forwarding records to a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl HistorySink for ChannelSink {
    async fn record(&self, record: RunRecord) {
        let _ = self.tx.send(record);
    }
}

pub async fn next_record(rx: &mut mpsc::UnboundedReceiver<RunRecord>) -> RunRecord {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("record within timeout")
        .expect("sink open")
}

pub fn chunk(text: &str, similarity: f32) -> RetrievedChunk {
    RetrievedChunk {
        text: text.to_string(),
        similarity,
        source_label: "kb.md".to_string(),
    }
}
