use crate::orchestration::engine::{ExecutionEngine, TraceEntry};
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::plan::{parse_raw_plan, ValidatedStep};
use crate::orchestration::trace_store::TraceStore;
use crate::orchestration::validator::{PlanRejection, PlanValidator};
use crate::planning::{AdmissionGate, FinalResult, PlanningCollaborator, Synthesis};
use crate::shared::ids::RequestId;
use crate::shared::logging::EventLog;
use crate::shared::time::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl TaskRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Validating,
    Executing,
    Synthesizing,
    Persisted,
    Rejected,
    Failed,
}

impl RunPhase {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (RunPhase::Planning, RunPhase::Validating)
                | (RunPhase::Planning, RunPhase::Rejected)
                | (RunPhase::Validating, RunPhase::Executing)
                | (RunPhase::Validating, RunPhase::Rejected)
                | (RunPhase::Executing, RunPhase::Synthesizing)
                | (RunPhase::Executing, RunPhase::Failed)
                | (RunPhase::Synthesizing, RunPhase::Persisted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Persisted | RunPhase::Rejected | RunPhase::Failed
        )
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Planning => write!(f, "planning"),
            RunPhase::Validating => write!(f, "validating"),
            RunPhase::Executing => write!(f, "executing"),
            RunPhase::Synthesizing => write!(f, "synthesizing"),
            RunPhase::Persisted => write!(f, "persisted"),
            RunPhase::Rejected => write!(f, "rejected"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

/// What the caller can rely on about side effects of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Nothing was dispatched.
    Rejected { reason: String },
    /// `completed_steps` ran and then `failed_step` failed; later steps never ran.
    PartialExecution {
        completed_steps: usize,
        failed_step: i64,
        error: String,
    },
    /// Every step ran. `synthesized` is false when the summary could not be produced.
    Completed { steps: usize, synthesized: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    pub request_id: RequestId,
    pub task: String,
    pub context: Map<String, Value>,
    pub plan: Vec<ValidatedStep>,
    pub trace: Vec<TraceEntry>,
    pub final_result: FinalResult,
    pub warnings: Vec<String>,
    pub outcome: RunOutcome,
    pub phase: RunPhase,
    pub phases: Vec<RunPhase>,
    pub created_at: i64,
}

impl TaskResponse {
    pub fn was_rejected(&self) -> bool {
        matches!(self.outcome, RunOutcome::Rejected { .. })
    }
}

struct RunTracker {
    phases: Vec<RunPhase>,
}

impl RunTracker {
    fn start() -> Self {
        Self {
            phases: vec![RunPhase::Planning],
        }
    }

    fn current(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Planning)
    }

    fn advance(&mut self, next: RunPhase) -> Result<(), OrchestratorError> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(OrchestratorError::InvalidPhaseTransition { from, to: next });
        }
        self.phases.push(next);
        Ok(())
    }
}

/// Request-scoped control loop: plan, validate, execute, synthesize, persist.
///
/// Steps of one run execute strictly in order on the calling thread. Separate
/// runs may share one orchestrator across threads; they only contend on the
/// planning admission gate.
pub struct TaskOrchestrator {
    planner: Arc<dyn PlanningCollaborator>,
    validator: PlanValidator,
    engine: ExecutionEngine,
    admission: Arc<AdmissionGate>,
    trace_store: TraceStore,
    log: EventLog,
}

impl TaskOrchestrator {
    pub fn new(
        planner: Arc<dyn PlanningCollaborator>,
        validator: PlanValidator,
        engine: ExecutionEngine,
        admission: Arc<AdmissionGate>,
        trace_store: TraceStore,
    ) -> Self {
        Self {
            planner,
            validator,
            engine,
            admission,
            trace_store,
            log: EventLog::disabled(),
        }
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn trace_store(&self) -> &TraceStore {
        &self.trace_store
    }

    pub fn admission(&self) -> &AdmissionGate {
        &self.admission
    }

    /// Always produces a response; failures are encoded in `outcome`.
    pub fn execute(&self, request: &TaskRequest) -> TaskResponse {
        let request_id = RequestId::generate();
        let created_at = now_millis();
        let mut run = RunTracker::start();
        self.log.info(
            "task.started",
            format!(
                "request_id={request_id} task_chars={} context_keys={}",
                request.task.chars().count(),
                request.context.len()
            ),
        );

        let plan = match self.plan_and_validate(&request_id, request, &mut run) {
            Ok(plan) => plan,
            Err(err) => {
                let reason = err.to_string();
                self.log.warn(
                    "task.rejected",
                    format!("request_id={request_id} reason={reason}"),
                );
                self.track(&request_id, &mut run, RunPhase::Rejected);
                let response = TaskResponse {
                    request_id,
                    task: request.task.clone(),
                    context: request.context.clone(),
                    plan: Vec::new(),
                    trace: Vec::new(),
                    final_result: FinalResult::rejected(&reason),
                    warnings: vec![reason.clone()],
                    outcome: RunOutcome::Rejected { reason },
                    phase: run.current(),
                    phases: run.phases,
                    created_at,
                };
                self.persist(&response);
                return response;
            }
        };

        self.track(&request_id, &mut run, RunPhase::Executing);
        let mut trace = Vec::with_capacity(plan.len());
        let mut failure = None;
        for step in &plan {
            let outcome = self.engine.execute(&request_id, step);
            trace.push(outcome.entry);
            if let Err(step_failure) = outcome.result {
                failure = Some(step_failure);
                break;
            }
        }
        let dispatched = trace.len();

        let mut warnings: Vec<String> = Vec::new();
        let outcome = match failure {
            Some(step_failure) => {
                self.track(&request_id, &mut run, RunPhase::Failed);
                let outcome = RunOutcome::PartialExecution {
                    completed_steps: dispatched.saturating_sub(1),
                    failed_step: step_failure.step_id,
                    error: step_failure.reason.clone(),
                };
                let err = OrchestratorError::from(step_failure);
                self.log.warn(
                    "task.aborted",
                    format!(
                        "request_id={request_id} skipped_steps={} error={err}",
                        plan.len() - dispatched
                    ),
                );
                warnings.push(err.to_string());
                outcome
            }
            None => {
                self.track(&request_id, &mut run, RunPhase::Synthesizing);
                RunOutcome::Completed {
                    steps: dispatched,
                    synthesized: true,
                }
            }
        };

        let executed_plan = &plan[..dispatched];
        let (final_result, outcome) = match self.synthesize(request, executed_plan, &trace) {
            Ok(Synthesis {
                final_result,
                warnings: synthesis_warnings,
            }) => {
                warnings.extend(synthesis_warnings);
                (final_result, outcome)
            }
            Err(err) => {
                let reason = err.to_string();
                self.log.warn(
                    "synthesis.failed",
                    format!("request_id={request_id} error={reason}"),
                );
                warnings.push(reason.clone());
                let completed = trace.len();
                let outcome = match outcome {
                    RunOutcome::Completed { steps, .. } => RunOutcome::Completed {
                        steps,
                        synthesized: false,
                    },
                    other => other,
                };
                (FinalResult::synthesis_failed(&reason, completed), outcome)
            }
        };

        if run.current() == RunPhase::Synthesizing {
            self.track(&request_id, &mut run, RunPhase::Persisted);
        }
        let response = TaskResponse {
            request_id,
            task: request.task.clone(),
            context: request.context.clone(),
            plan,
            trace,
            final_result,
            warnings,
            outcome,
            phase: run.current(),
            phases: run.phases,
            created_at,
        };
        self.persist(&response);
        self.log.info(
            "task.finished",
            format!(
                "request_id={} phase={} steps={}",
                response.request_id,
                response.phase,
                response.trace.len()
            ),
        );
        response
    }

    fn plan_and_validate(
        &self,
        request_id: &RequestId,
        request: &TaskRequest,
        run: &mut RunTracker,
    ) -> Result<Vec<ValidatedStep>, OrchestratorError> {
        if request.task.trim().is_empty() {
            return Err(PlanRejection::Malformed("task must be non-empty".to_string()).into());
        }

        let raw = {
            let _permit = self.admission.acquire();
            self.planner
                .plan(&request.task, &request.context)
                .map_err(OrchestratorError::PlannerUnavailable)?
        };
        let steps = parse_raw_plan(&raw).map_err(PlanRejection::Malformed)?;
        self.log.info(
            "plan.received",
            format!("request_id={request_id} steps={}", steps.len()),
        );

        self.track(request_id, run, RunPhase::Validating);
        let plan = self.validator.validate(&steps)?;
        Ok(plan)
    }

    fn synthesize(
        &self,
        request: &TaskRequest,
        plan: &[ValidatedStep],
        trace: &[TraceEntry],
    ) -> Result<Synthesis, OrchestratorError> {
        let _permit = self.admission.acquire();
        self.planner
            .synthesize(&request.task, plan, trace)
            .map_err(OrchestratorError::SynthesisFailed)
    }

    fn persist(&self, response: &TaskResponse) {
        if let Err(err) = self.trace_store.persist(response) {
            let err = OrchestratorError::from(err);
            self.log.warn(
                "trace.persist_failed",
                format!("request_id={} error={err}", response.request_id),
            );
        }
    }

    fn track(&self, request_id: &RequestId, run: &mut RunTracker, next: RunPhase) {
        if let Err(err) = run.advance(next) {
            self.log.error(
                "task.phase_invalid",
                format!("request_id={request_id} error={err}"),
            );
        }
    }
}
