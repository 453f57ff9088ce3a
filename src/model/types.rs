use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A retrieved passage, as handed over by the search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub text: String,
    pub similarity: f32,
    pub source_label: String,
}

/// Sampling parameters for a completion.
///
/// Optional knobs use disabled sentinels (`top_k == 0`, penalties `0.0`,
/// `repetition_penalty == 1.0`, empty `stop_sequences`, `seed == None`); a
/// sentinel value never reaches the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionParameters {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    #[serde(default)]
    pub top_k: u32,
    #[serde(default)]
    pub presence_penalty: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub json_mode: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_flags: BTreeMap<String, bool>,
}

fn default_repetition_penalty() -> f64 {
    1.0
}

impl Default for CompletionParameters {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_k: 0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            repetition_penalty: default_repetition_penalty(),
            seed: None,
            stop_sequences: Vec::new(),
            json_mode: false,
            template_flags: BTreeMap::new(),
        }
    }
}

/// Primary endpoint plus an optional single-hop fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPair {
    pub primary: String,
    pub fallback: Option<String>,
}

impl EndpointPair {
    pub fn new(primary: impl Into<String>, fallback: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback,
        }
    }

    /// Fallback URL if it is usable: non-empty and distinct from the primary.
    pub fn effective_fallback(&self) -> Option<&str> {
        self.fallback
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty() && *url != self.primary)
    }
}
