pub mod types;

pub use types::{CompletionParameters, EndpointPair, Message, RetrievedChunk, Role};
