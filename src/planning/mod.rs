pub mod admission;
pub mod http;
pub mod prompts;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use http::{HttpPlanner, HttpPlannerConfig};

use crate::orchestration::engine::TraceEntry;
use crate::orchestration::plan::ValidatedStep;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("planner credential env var `{env}` is not set")]
    MissingApiKey { env: String },
    #[error("planner request failed: {0}")]
    Transport(String),
    #[error("planner returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("planner response is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Text,
    Structured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub content: Value,
}

impl FinalResult {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Text,
            content: Value::String(message.into()),
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            kind: ResultKind::Structured,
            content: json!({
                "status": "plan_rejected",
                "message": "The plan was rejected before any action was taken.",
                "reason": reason,
            }),
        }
    }

    pub fn synthesis_failed(reason: &str, completed_steps: usize) -> Self {
        Self {
            kind: ResultKind::Structured,
            content: json!({
                "status": "synthesis_failed",
                "message": "Steps were executed but the result could not be synthesized; see the trace.",
                "reason": reason,
                "completed_steps": completed_steps,
            }),
        }
    }

    /// Accepts `{"type", "content"}`, a bare string, or any other object.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(text) => Ok(Self::text(text.clone())),
            Value::Object(map) if map.contains_key("type") => {
                serde_json::from_value(value.clone()).map_err(|err| err.to_string())
            }
            Value::Object(_) => Ok(Self {
                kind: ResultKind::Structured,
                content: value.clone(),
            }),
            other => Err(format!("`final_result` must be an object or string, got {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub final_result: FinalResult,
    pub warnings: Vec<String>,
}

/// Black-box planning and synthesis backend.
///
/// `plan` returns raw JSON; shape checking happens in the orchestrator so a
/// misbehaving backend can never hand untyped data to execution.
pub trait PlanningCollaborator: Send + Sync {
    fn plan(&self, task: &str, context: &Map<String, Value>) -> Result<Value, PlannerError>;

    fn synthesize(
        &self,
        task: &str,
        plan: &[ValidatedStep],
        trace: &[TraceEntry],
    ) -> Result<Synthesis, PlannerError>;
}

pub fn parse_synthesis(value: &Value) -> Result<Synthesis, PlannerError> {
    let Value::Object(map) = value else {
        return Err(PlannerError::Malformed(
            "synthesis response must be a JSON object".to_string(),
        ));
    };
    let final_result = map
        .get("final_result")
        .ok_or_else(|| PlannerError::Malformed("synthesis response missing `final_result`".to_string()))
        .and_then(|raw| FinalResult::from_value(raw).map_err(PlannerError::Malformed))?;
    let warnings = match map.get("warnings") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(text)) => vec![text.clone()],
        Some(_) => {
            return Err(PlannerError::Malformed(
                "`warnings` must be an array of strings".to_string(),
            ))
        }
    };
    Ok(Synthesis {
        final_result,
        warnings,
    })
}
