use crate::agents::AgentBindings;
use crate::capability::AgentKind;
use crate::orchestration::plan::ValidatedStep;
use crate::orchestration::sanitize::ArgumentSanitizer;
use crate::shared::ids::RequestId;
use crate::shared::logging::EventLog;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;

pub const DEFAULT_SUMMARY_BUDGET: usize = 1200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step_id: i64,
    pub agent: AgentKind,
    pub action: String,
    pub request: Map<String, Value>,
    pub response_summary: String,
    pub duration_ms: u64,
    pub truncated: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step {step_id} ({agent}.{action}) failed: {reason}")]
pub struct StepFailure {
    pub step_id: i64,
    pub agent: AgentKind,
    pub action: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub entry: TraceEntry,
    pub result: Result<(), StepFailure>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs one validated step against its bound agent.
///
/// Failures never escape as panics or early returns: every call yields a
/// `TraceEntry`, and the caller decides whether to continue.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    bindings: AgentBindings,
    sanitizer: ArgumentSanitizer,
    summary_budget: usize,
    log: EventLog,
}

impl ExecutionEngine {
    pub fn new(bindings: AgentBindings, sanitizer: ArgumentSanitizer) -> Self {
        Self {
            bindings,
            sanitizer,
            summary_budget: DEFAULT_SUMMARY_BUDGET,
            log: EventLog::disabled(),
        }
    }

    pub fn with_summary_budget(mut self, budget: usize) -> Self {
        self.summary_budget = budget.max(1);
        self
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn summary_budget(&self) -> usize {
        self.summary_budget
    }

    pub fn execute(&self, request_id: &RequestId, step: &ValidatedStep) -> StepOutcome {
        let mut entry = TraceEntry {
            step_id: step.step_id(),
            agent: step.agent(),
            action: step.action().to_string(),
            request: step.args().to_json(),
            response_summary: String::new(),
            duration_ms: 0,
            truncated: false,
            warnings: Vec::new(),
        };

        if let Err(err) = self.sanitizer.check_step(step) {
            self.log.warn(
                "step.sanitize_rejected",
                format!(
                    "request_id={request_id} step_id={} arg={} reason={}",
                    step.step_id(),
                    err.arg,
                    err.reason
                ),
            );
            return self.failed(entry, err.to_string());
        }

        let Some(agent) = self.bindings.get(step.agent()) else {
            return self.failed(entry, format!("no implementation bound for {}", step.agent()));
        };

        self.log.info(
            "step.dispatch",
            format!(
                "request_id={request_id} step_id={} agent={} action={}",
                step.step_id(),
                step.agent(),
                step.action()
            ),
        );
        let started = Instant::now();
        let result = agent.invoke(step.action_id(), step.args());
        entry.duration_ms = elapsed_ms(started);

        match result {
            Ok(output) => {
                let (summary, cut) = summarize_response(&output.data, self.summary_budget);
                entry.response_summary = summary;
                entry.truncated = cut || output.truncated;
                entry.warnings = output.warnings;
                if cut {
                    entry.warnings.push(format!(
                        "response summary truncated to {} characters",
                        self.summary_budget
                    ));
                }
                self.log.info(
                    "step.completed",
                    format!(
                        "request_id={request_id} step_id={} duration_ms={} truncated={}",
                        entry.step_id, entry.duration_ms, entry.truncated
                    ),
                );
                StepOutcome {
                    entry,
                    result: Ok(()),
                }
            }
            Err(err) => {
                self.log.error(
                    "step.failed",
                    format!(
                        "request_id={request_id} step_id={} error={err}",
                        entry.step_id
                    ),
                );
                self.failed(entry, err.to_string())
            }
        }
    }

    fn failed(&self, mut entry: TraceEntry, reason: String) -> StepOutcome {
        let (summary, cut) = summarize_response(
            &serde_json::json!({ "error": reason }),
            self.summary_budget,
        );
        entry.response_summary = summary;
        entry.truncated = cut;
        entry.warnings.push(reason.clone());
        let failure = StepFailure {
            step_id: entry.step_id,
            agent: entry.agent,
            action: entry.action.clone(),
            reason,
        };
        StepOutcome {
            entry,
            result: Err(failure),
        }
    }
}

/// Serializes `data` and cuts it to exactly `budget` characters when longer.
pub fn summarize_response(data: &Value, budget: usize) -> (String, bool) {
    let serialized = match data {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    };
    clip_to_budget(&serialized, budget)
}

pub fn clip_to_budget(text: &str, budget: usize) -> (String, bool) {
    if text.chars().count() <= budget {
        return (text.to_string(), false);
    }
    (text.chars().take(budget).collect(), true)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
