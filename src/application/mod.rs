//! Application Layer
//!
//! Per-instrument state, the tick orchestrator and the protective-level
//! mutation manager.

pub mod engine_state;
pub mod mutation_sync;
pub mod orchestrator;

pub use engine_state::{DailyLevels, InstrumentState, PublishedKey};
pub use mutation_sync::{MutationConfig, MutationSyncManager};
pub use orchestrator::{
    DecisionOrchestrator, InstrumentStatus, OrchestratorConfig, OrchestratorError, OrchestratorStatus,
};
