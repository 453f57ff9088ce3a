pub mod client;
pub mod error;
pub mod request;

pub use client::EndpointResolver;
pub use request::{build_completion_request, build_embeddings_request};
