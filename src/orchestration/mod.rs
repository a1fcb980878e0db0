pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod sanitize;
pub mod trace_store;
pub mod validator;

pub use engine::{ExecutionEngine, StepFailure, StepOutcome, TraceEntry};
pub use error::OrchestratorError;
pub use orchestrator::{RunOutcome, RunPhase, TaskOrchestrator, TaskRequest, TaskResponse};
pub use plan::{ArgValue, RawPlanStep, ValidatedArgs, ValidatedStep};
pub use sanitize::ArgumentSanitizer;
pub use trace_store::{TraceRecord, TraceStore, TraceStoreError};
pub use validator::{PlanRejection, PlanValidator};
