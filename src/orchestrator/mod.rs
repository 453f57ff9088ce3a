pub mod record;
pub mod run;

pub use record::{RagRunConfig, RunRecord, RunStatus};
pub use run::{
    GenerationOrchestrator, GenerationRequest, RagSettings, RunEvent, RunHandle, RunState,
};
