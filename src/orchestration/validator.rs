use crate::capability::{ArgKind, ArgSpec, CapabilityRegistry, LookupError};
use crate::orchestration::plan::{integral_value, ArgValue, RawPlanStep, ValidatedArgs, ValidatedStep};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanRejection {
    #[error("planner response is malformed: {0}")]
    Malformed(String),
    #[error("step {step_id}: step_id must not be negative")]
    NegativeStepId { step_id: i64 },
    #[error("step {step_id}: step_id must be greater than previous step_id {previous}")]
    NonIncreasingStepId { step_id: i64, previous: i64 },
    #[error("step {step_id}: {source}")]
    Lookup {
        step_id: i64,
        #[source]
        source: LookupError,
    },
    #[error("step {step_id}: missing required argument `{arg}` for action `{action}`")]
    MissingArgument {
        step_id: i64,
        action: String,
        arg: String,
    },
    #[error("step {step_id}: argument `{arg}` for action `{action}` must be {expected}")]
    InvalidArgumentType {
        step_id: i64,
        action: String,
        arg: String,
        expected: ArgKind,
    },
    #[error("step {step_id}: argument `{arg}` for action `{action}` is invalid: {reason}")]
    InvalidArgumentValue {
        step_id: i64,
        action: String,
        arg: String,
        reason: String,
    },
}

/// Narrows untrusted planner output to `ValidatedStep`s.
///
/// All-or-nothing: the first failing step rejects the whole plan. Arguments not
/// declared by the action schema are dropped rather than rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanValidator {
    registry: CapabilityRegistry,
}

impl PlanValidator {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, raw: &[RawPlanStep]) -> Result<Vec<ValidatedStep>, PlanRejection> {
        let mut validated = Vec::with_capacity(raw.len());
        let mut previous: Option<i64> = None;

        for step in raw {
            if step.step_id < 0 {
                return Err(PlanRejection::NegativeStepId {
                    step_id: step.step_id,
                });
            }
            if let Some(previous) = previous {
                if step.step_id <= previous {
                    return Err(PlanRejection::NonIncreasingStepId {
                        step_id: step.step_id,
                        previous,
                    });
                }
            }
            previous = Some(step.step_id);

            let schema = self
                .registry
                .lookup(&step.agent, &step.action)
                .map_err(|source| PlanRejection::Lookup {
                    step_id: step.step_id,
                    source,
                })?;

            let mut args = ValidatedArgs::default();
            for spec in schema.args {
                match step.args.get(spec.name) {
                    None | Some(Value::Null) => {
                        if spec.required {
                            return Err(PlanRejection::MissingArgument {
                                step_id: step.step_id,
                                action: schema.action.to_string(),
                                arg: spec.name.to_string(),
                            });
                        }
                    }
                    Some(value) => {
                        let coerced = coerce_argument(spec, value).map_err(|failure| {
                            failure.into_rejection(step.step_id, schema.action, spec)
                        })?;
                        args.insert(spec.name, coerced);
                    }
                }
            }

            validated.push(ValidatedStep::new(step.step_id, schema, args));
        }

        Ok(validated)
    }
}

enum CoercionFailure {
    Kind,
    Value(String),
}

impl CoercionFailure {
    fn into_rejection(self, step_id: i64, action: &str, spec: &ArgSpec) -> PlanRejection {
        match self {
            Self::Kind => PlanRejection::InvalidArgumentType {
                step_id,
                action: action.to_string(),
                arg: spec.name.to_string(),
                expected: spec.kind,
            },
            Self::Value(reason) => PlanRejection::InvalidArgumentValue {
                step_id,
                action: action.to_string(),
                arg: spec.name.to_string(),
                reason,
            },
        }
    }
}

fn coerce_argument(spec: &ArgSpec, value: &Value) -> Result<ArgValue, CoercionFailure> {
    let coerced = match spec.kind {
        ArgKind::String => ArgValue::String(
            value
                .as_str()
                .ok_or(CoercionFailure::Kind)?
                .to_string(),
        ),
        ArgKind::Integer => ArgValue::Integer(integral_value(value).ok_or(CoercionFailure::Kind)?),
        ArgKind::Boolean => ArgValue::Boolean(value.as_bool().ok_or(CoercionFailure::Kind)?),
        ArgKind::StringList => {
            let items = value.as_array().ok_or(CoercionFailure::Kind)?;
            let strings = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or(CoercionFailure::Kind)?;
            ArgValue::StringList(strings)
        }
    };

    if spec.choices.is_empty() {
        return Ok(coerced);
    }
    restrict_to_choices(spec, coerced)
}

fn restrict_to_choices(spec: &ArgSpec, value: ArgValue) -> Result<ArgValue, CoercionFailure> {
    let canonical = |raw: &str| {
        let trimmed = raw.trim();
        spec.choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(trimmed))
            .map(|choice| choice.to_string())
            .ok_or_else(|| {
                CoercionFailure::Value(format!(
                    "`{trimmed}` is not one of: {}",
                    spec.choices.join(", ")
                ))
            })
    };

    match value {
        ArgValue::String(raw) => canonical(&raw).map(ArgValue::String),
        ArgValue::StringList(raw) => {
            let mut normalized = raw
                .iter()
                .map(|item| canonical(item))
                .collect::<Result<Vec<_>, _>>()?;
            normalized.sort();
            normalized.dedup();
            if normalized.is_empty() {
                return Err(CoercionFailure::Value(
                    "at least one value is required".to_string(),
                ));
            }
            Ok(ArgValue::StringList(normalized))
        }
        other => Ok(other),
    }
}
