use serde_json::{Value, json};

use crate::constants::{SENTINEL_PENALTY, SENTINEL_REPETITION_PENALTY, SENTINEL_TOP_K};
use crate::model::{CompletionParameters, Message};

pub struct RequestBuilder {
    body: serde_json::Map<String, Value>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            body: serde_json::Map::new(),
        }
    }

    pub fn add_required<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    /// Inserts `value` only when `enabled`, i.e. when it is not the disabled sentinel.
    pub fn add_optional<T: Into<Value>>(mut self, key: &str, value: T, enabled: bool) -> Self {
        if enabled {
            self.body.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.body)
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the streaming chat-completions body for an OpenAI-compatible server.
pub fn build_completion_request(
    model: &str,
    messages: &[Message],
    params: &CompletionParameters,
) -> Value {
    let messages_value = serde_json::to_value(messages).unwrap_or_else(|_| json!([]));

    RequestBuilder::new()
        .add_required("model", model)
        .add_required("messages", messages_value)
        .add_required("temperature", params.temperature)
        .add_required("top_p", params.top_p)
        .add_required("max_tokens", params.max_tokens)
        .add_required("stream", true)
        .add_optional("top_k", params.top_k, params.top_k > SENTINEL_TOP_K)
        .add_optional(
            "presence_penalty",
            params.presence_penalty,
            params.presence_penalty != SENTINEL_PENALTY,
        )
        .add_optional(
            "frequency_penalty",
            params.frequency_penalty,
            params.frequency_penalty != SENTINEL_PENALTY,
        )
        .add_optional(
            "repeat_penalty",
            params.repetition_penalty,
            params.repetition_penalty != SENTINEL_REPETITION_PENALTY,
        )
        .add_optional("seed", params.seed.unwrap_or_default(), params.seed.is_some())
        .add_optional(
            "stop",
            params.stop_sequences.clone(),
            !params.stop_sequences.is_empty(),
        )
        .add_optional(
            "response_format",
            json!({ "type": "json_object" }),
            params.json_mode,
        )
        .add_optional(
            "chat_template_kwargs",
            json!(params.template_flags),
            !params.template_flags.is_empty(),
        )
        .build()
}

/// Builds the body for `POST /v1/embeddings`.
pub fn build_embeddings_request(model: &str, texts: &[String]) -> Value {
    RequestBuilder::new()
        .add_required("model", model)
        .add_required("input", texts.to_vec())
        .build()
}
