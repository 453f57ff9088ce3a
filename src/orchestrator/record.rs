use serde::{Deserialize, Serialize};

use crate::constants::{RECORD_PREVIEW_CHARS, TOKEN_TO_CHAR_RATIO};
use crate::model::{CompletionParameters, Message};
use crate::prompt::preview;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Retrieval settings and timings for a run that took the RAG path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRunConfig {
    pub embed_model: String,
    pub top_k: usize,
    pub threshold: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_filter: Option<Vec<String>>,
    pub chunks_used: usize,
    pub embedding_time_ms: u64,
    pub search_time_ms: u64,
}

/// Terminal audit entry for one run, handed to the history sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub model: String,
    pub prompt_preview: String,
    pub response_preview: String,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub token_estimate: u64,
    pub messages: Vec<Message>,
    pub params: CompletionParameters,
    pub full_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_config: Option<RagRunConfig>,
}

/// Inputs shared by both record constructors.
pub struct RecordContext<'a> {
    pub model: &'a str,
    pub user_prompt: &'a str,
    pub messages: &'a [Message],
    pub params: &'a CompletionParameters,
    pub rag_config: Option<RagRunConfig>,
    pub duration_ms: u64,
}

impl RunRecord {
    pub fn success(ctx: RecordContext<'_>, output: &str) -> Self {
        Self::build(ctx, RunStatus::Success, preview(output, RECORD_PREVIEW_CHARS), output)
    }

    pub fn error(ctx: RecordContext<'_>, error_message: &str, output: &str) -> Self {
        Self::build(ctx, RunStatus::Error, error_message.to_string(), output)
    }

    fn build(
        ctx: RecordContext<'_>,
        status: RunStatus,
        response_preview: String,
        output: &str,
    ) -> Self {
        Self {
            model: ctx.model.to_string(),
            prompt_preview: preview(ctx.user_prompt, RECORD_PREVIEW_CHARS),
            response_preview,
            duration_ms: ctx.duration_ms,
            status,
            token_estimate: estimate_tokens(output),
            messages: ctx.messages.to_vec(),
            params: ctx.params.clone(),
            full_response: output.to_string(),
            rag_config: ctx.rag_config,
        }
    }
}

/// Rough token count: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as f64 * TOKEN_TO_CHAR_RATIO).ceil() as u64
}
