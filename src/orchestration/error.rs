use crate::credentials::CredentialError;
use crate::orchestration::engine::StepFailure;
use crate::orchestration::orchestrator::RunPhase;
use crate::orchestration::trace_store::TraceStoreError;
use crate::orchestration::validator::PlanRejection;
use crate::planning::PlannerError;

/// Failure taxonomy shared by task runs and the provisioning stage.
///
/// Validation and credential failures happen before any external action.
/// Step and synthesis failures keep whatever was already collected.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("plan rejected: {0}")]
    PlanRejected(#[from] PlanRejection),
    #[error("planner unavailable: {0}")]
    PlannerUnavailable(#[source] PlannerError),
    #[error("step execution failed: {0}")]
    StepExecutionFailed(#[from] StepFailure),
    #[error("synthesis failed: {0}")]
    SynthesisFailed(#[source] PlannerError),
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(#[from] CredentialError),
    #[error("trace persistence failed: {0}")]
    PersistenceFailed(#[from] TraceStoreError),
    #[error("run phase transition `{from}` -> `{to}` is invalid")]
    InvalidPhaseTransition { from: RunPhase, to: RunPhase },
}

impl OrchestratorError {
    /// Errors that end a run before anything was dispatched.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::PlanRejected(_) | Self::PlannerUnavailable(_))
    }
}
