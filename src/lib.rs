//! Streaming, retrieval-augmented completions against OpenAI-compatible servers.
//!
//! A run goes through [`orchestrator::GenerationOrchestrator`]: optional
//! retrieval ([`retrieval::RetrievalCoordinator`]), prompt assembly
//! ([`prompt::PromptAugmenter`]), then a cancellable event stream from
//! [`streaming::StreamingCompletionClient`], with a single fallback hop handled
//! by [`http::EndpointResolver`].

pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod storage;
pub mod streaming;

#[cfg(test)]
mod tests;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
