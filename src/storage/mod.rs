pub mod corpus;
pub mod history;

pub use corpus::{CorpusEntry, JsonlCorpus};
pub use history::{HistorySink, JsonlHistorySink, NullHistorySink};
