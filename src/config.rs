use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::constants::{
    CHAT_COMPLETIONS_PATH, DEFAULT_MAX_TOKENS, DEFAULT_RAG_THRESHOLD, DEFAULT_RAG_TOP_K,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_P, EMBEDDINGS_PATH,
};
use crate::http::EndpointResolver;
use crate::model::{CompletionParameters, EndpointPair};
use crate::orchestrator::{GenerationOrchestrator, GenerationRequest, RagSettings};
use crate::retrieval::{HttpEmbedder, RetrievalCoordinator, RetrievalOptions};
use crate::storage::{HistorySink, JsonlCorpus, JsonlHistorySink, NullHistorySink};
use crate::streaming::StreamingCompletionClient;

#[derive(Parser, Debug, Clone)]
#[command(name = "ragstream")]
#[command(about = "stream completions from an openai-compatible server, optionally grounded in a local knowledge base")]
pub struct Config {
    #[arg(help = "user prompt (use {{context}} to place retrieved passages)")]
    pub prompt: Option<String>,

    #[arg(long = "prompt", conflicts_with = "prompt", help = "user prompt")]
    pub prompt_flag: Option<String>,

    #[arg(long, default_value = "", help = "system prompt")]
    pub system: String,

    #[arg(long, help = "completion model id")]
    pub model: String,

    #[arg(long, default_value = "http://localhost:1234", help = "model server base url")]
    pub base_url: String,

    #[arg(long, help = "fallback base url used once if the primary is unreachable")]
    pub fallback_url: Option<String>,

    #[arg(long, env = "RAGSTREAM_API_KEY", hide_env_values = true, help = "bearer token")]
    pub api_key: Option<String>,

    #[arg(long, help = "ground the completion in the knowledge base")]
    pub rag: bool,

    #[arg(long, help = "embedding model id (required for --rag)")]
    pub embed_model: Option<String>,

    #[arg(long, help = "knowledge base index (jsonl of {text, source, embedding})")]
    pub corpus: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_RAG_TOP_K, help = "passages to retrieve")]
    pub top_k: usize,

    #[arg(long, default_value_t = DEFAULT_RAG_THRESHOLD, help = "minimum similarity (0-1)")]
    pub threshold: f32,

    #[arg(long = "source", help = "restrict retrieval to these sources (repeatable)")]
    pub sources: Vec<String>,

    #[arg(long, help = "append run records to this jsonl file")]
    pub history: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f64,

    #[arg(long, default_value_t = DEFAULT_TOP_P)]
    pub top_p: f64,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = 0, help = "top-k sampling (0 disables)")]
    pub sampling_top_k: u32,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub presence_penalty: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub frequency_penalty: f64,

    #[arg(long, default_value_t = 1.0, help = "repetition penalty (1.0 disables)")]
    pub repetition_penalty: f64,

    #[arg(long)]
    pub seed: Option<i64>,

    #[arg(long = "stop", help = "stop sequence (repeatable)")]
    pub stop_sequences: Vec<String>,

    #[arg(long, help = "request a json object response")]
    pub json_mode: bool,

    #[arg(long = "template-flag", value_parser = parse_template_flag, help = "chat template flag name=true|false (repeatable)")]
    pub template_flags: Vec<(String, bool)>,

    #[arg(long, value_parser = humantime::parse_duration, help = "stop the run after this long (e.g. 30s, 2m)")]
    pub stop_after: Option<Duration>,

    #[arg(long, default_value = "600", help = "ttl for cached embeddings in seconds")]
    pub embedding_cache_ttl_seconds: u64,

    #[arg(
        long,
        default_value = "info",
        help = "log level (off, error, warn, info, debug, trace)"
    )]
    pub log_level: String,
}

fn parse_template_flag(raw: &str) -> Result<(String, bool), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=true|false, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("template flag name is empty".to_string());
    }
    let value = value
        .trim()
        .parse::<bool>()
        .map_err(|_| format!("template flag '{}' must be true or false", name))?;
    Ok((name.to_string(), value))
}

/// Connection settings handed to each client; immutable per call.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub fallback_url: Option<String>,
    pub api_key: Option<String>,
}

impl ClientConfig {
    pub fn endpoints(&self, path: &str) -> EndpointPair {
        EndpointPair::new(
            join_url(&self.base_url, path),
            self.fallback_url
                .as_deref()
                .map(str::trim)
                .filter(|base| !base.is_empty())
                .map(|base| join_url(base, path)),
        )
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

impl Config {
    pub fn user_prompt(&self) -> String {
        self.prompt
            .clone()
            .or_else(|| self.prompt_flag.clone())
            .unwrap_or_default()
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            fallback_url: self.fallback_url.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn completion_parameters(&self) -> CompletionParameters {
        CompletionParameters {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            top_k: self.sampling_top_k,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            repetition_penalty: self.repetition_penalty,
            seed: self.seed,
            stop_sequences: self.stop_sequences.clone(),
            json_mode: self.json_mode,
            template_flags: self.template_flags.iter().cloned().collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn generation_request(&self) -> GenerationRequest {
        let rag = self.rag.then(|| RagSettings {
            embed_model: self.embed_model.clone().unwrap_or_default(),
            options: RetrievalOptions {
                top_k: self.top_k,
                threshold: self.threshold,
                source_filter: (!self.sources.is_empty()).then(|| self.sources.clone()),
            },
        });

        GenerationRequest {
            model: self.model.clone(),
            system_prompt: self.system.clone(),
            user_prompt: self.user_prompt(),
            params: self.completion_parameters(),
            rag,
        }
    }
}

/// Wires the orchestrator and its collaborators from the command line.
pub fn build_orchestrator(config: &Config) -> Result<GenerationOrchestrator, Box<dyn std::error::Error>> {
    // no overall timeout: cancellation is the only interruption
    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;

    let client_config = config.client_config();
    let resolver = EndpointResolver::new(http_client, client_config.api_key.clone());

    let retrieval = match (&config.corpus, config.rag) {
        (Some(corpus_path), true) => {
            let corpus = JsonlCorpus::load(corpus_path)?;
            let embedder = HttpEmbedder::new(
                resolver.clone(),
                client_config.endpoints(EMBEDDINGS_PATH),
                Duration::from_secs(config.embedding_cache_ttl_seconds),
            );
            Some(RetrievalCoordinator::new(Arc::new(embedder), Arc::new(corpus)))
        }
        _ => None,
    };

    let history: Arc<dyn HistorySink> = match &config.history {
        Some(path) => Arc::new(JsonlHistorySink::new(path)),
        None => Arc::new(NullHistorySink),
    };

    Ok(GenerationOrchestrator::new(
        StreamingCompletionClient::new(resolver),
        client_config.endpoints(CHAT_COMPLETIONS_PATH),
        retrieval,
        history,
    ))
}

pub fn validate_config(config: &Config) -> Result<(), String> {
    validate_url("base", &config.base_url)?;
    if let Some(fallback) = config.fallback_url.as_deref()
        && !fallback.trim().is_empty()
    {
        validate_url("fallback", fallback)?;
    }
    if config.model.trim().is_empty() {
        return Err("model must not be empty".to_string());
    }
    if config.rag {
        if config.embed_model.as_deref().is_none_or(|m| m.trim().is_empty()) {
            log::warn!("--rag without --embed-model, running ungrounded");
        }
        if config.corpus.is_none() {
            log::warn!("--rag without --corpus, running ungrounded");
        }
    }
    if !(0.0..=1.0).contains(&config.threshold) {
        return Err(format!(
            "threshold must be between 0 and 1: {}",
            config.threshold
        ));
    }
    Ok(())
}

fn validate_url(label: &str, raw: &str) -> Result<(), String> {
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Err(format!(
            "invalid {} URL (must start with http:// or https://): {}",
            label, raw
        ));
    }
    if let Err(e) = url::Url::parse(raw) {
        return Err(format!("invalid {} URL format: {}", label, e));
    }
    Ok(())
}
