/// OpenAI-compatible endpoints
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const EMBEDDINGS_PATH: &str = "/v1/embeddings";

/// Request headers
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_SSE: &str = "text/event-stream";

/// Default sampling values
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_RAG_TOP_K: usize = 5;
pub const DEFAULT_RAG_THRESHOLD: f32 = 0.3;

/// Disabled sentinels for optional sampling parameters
pub const SENTINEL_TOP_K: u32 = 0;
pub const SENTINEL_PENALTY: f64 = 0.0;
pub const SENTINEL_REPETITION_PENALTY: f64 = 1.0;

/// SSE parsing constants
pub const SSE_DATA_PREFIX: &str = "data: ";
pub const SSE_DONE_MESSAGE: &str = "[DONE]";
pub const SSE_LINE_BOUNDARY: char = '\n';

/// Prompt augmentation
pub const CONTEXT_PLACEHOLDER: &str = "{{context}}";
pub const CONTEXT_HEADER: &str = "## Retrieved Context\nUse the following passages from the knowledge base when they are relevant to the request:\n\n";
pub const NO_CONTEXT_FALLBACK: &str = "(no relevant context was found in the knowledge base)";
pub const CONTEXT_PREVIEW_CHARS: usize = 300;
pub const ELLIPSIS: &str = "...";

/// Run record
pub const RECORD_PREVIEW_CHARS: usize = 200;
pub const TOKEN_TO_CHAR_RATIO: f64 = 0.25;

/// Error messages
pub const ERROR_CANCELLED: &str = "Request cancelled";
pub const ERROR_MISSING_BODY: &str = "Response has no readable body";
pub const ERROR_SERVER_UNAVAILABLE: &str = "Model server not reachable";
pub const ERROR_EMPTY_EMBEDDING: &str = "Embedding response contained no vectors";

/// Logging prefixes
pub const LOG_PREFIX_SUCCESS: &str = "✅";
pub const LOG_PREFIX_ERROR: &str = "❌";
pub const LOG_PREFIX_WARNING: &str = "⚠️";
pub const LOG_PREFIX_CONN: &str = "↔️";
