pub mod collaborators;
pub mod coordinator;
pub mod http_embedder;

pub use collaborators::{EmbeddingData, EmbeddingResponse, Embedder, VectorIndex};
pub use coordinator::{RetrievalCoordinator, RetrievalOptions, RetrievalResult};
pub use http_embedder::HttpEmbedder;
