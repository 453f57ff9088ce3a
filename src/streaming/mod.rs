pub mod chunks;
pub mod client;
pub mod sse;

pub use client::{CompletionPayload, CompletionStream, StreamingCompletionClient};
pub use sse::{StreamEvent, StreamOutcome, pump_event_stream};
