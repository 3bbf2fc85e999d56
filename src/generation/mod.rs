pub mod error;
pub mod orchestrator;
pub mod state;
pub mod steps;

pub use error::GenerationError;
pub use orchestrator::{
    GenerationOrchestrator, GenerationRequest, OrchestratorConfig, StateObserver, ValidationReport,
};
pub use state::{GenerationState, ProgressInfo, StatusKind};
pub use steps::{GenerationStep, TOTAL_STEPS};
