use crate::capability::{ActionId, ActionSchema, AgentKind};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One planner-proposed step. Untrusted until it passes `PlanValidator`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPlanStep {
    pub step_id: i64,
    pub agent: String,
    pub action: String,
    pub args: Map<String, Value>,
}

/// Accepts either a bare array of steps or an object wrapping it under `plan`.
pub fn parse_raw_plan(value: &Value) -> Result<Vec<RawPlanStep>, String> {
    let steps = match value {
        Value::Array(steps) => steps,
        Value::Object(map) => match map.get("plan") {
            Some(Value::Array(steps)) => steps,
            Some(_) => return Err("`plan` must be an array of steps".to_string()),
            None => return Err("planner response has no `plan` array".to_string()),
        },
        _ => return Err("planner response must be an array or an object with `plan`".to_string()),
    };

    steps
        .iter()
        .enumerate()
        .map(|(position, step)| parse_raw_step(position, step))
        .collect()
}

fn parse_raw_step(position: usize, value: &Value) -> Result<RawPlanStep, String> {
    let Value::Object(map) = value else {
        return Err(format!("plan entry {position} is not an object"));
    };
    let step_id = map
        .get("step_id")
        .and_then(integral_value)
        .ok_or_else(|| format!("plan entry {position} is missing an integer `step_id`"))?;
    let agent = map
        .get("agent")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("plan entry {position} is missing string `agent`"))?;
    let action = map
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("plan entry {position} is missing string `action`"))?;
    let args = match map.get("args") {
        Some(Value::Object(args)) => args.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(_) => return Err(format!("plan entry {position} has non-object `args`")),
    };
    Ok(RawPlanStep {
        step_id,
        agent: agent.to_string(),
        action: action.to_string(),
        args,
    })
}

/// Integers pass through; floats with no fractional part are narrowed.
pub(crate) fn integral_value(value: &Value) -> Option<i64> {
    if let Some(int) = value.as_i64() {
        return Some(int);
    }
    let float = value.as_f64()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() <= i64::MAX as f64 {
        return Some(float as i64);
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Boolean(bool),
    Integer(i64),
    String(String),
    StringList(Vec<String>),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::StringList(values) => Some(values),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(value) => Value::Bool(*value),
            Self::Integer(value) => Value::from(*value),
            Self::String(value) => Value::String(value.clone()),
            Self::StringList(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Arguments narrowed to the declared schema and coerced to their declared kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidatedArgs(BTreeMap<String, ArgValue>);

impl ValidatedArgs {
    pub(crate) fn insert(&mut self, name: &str, value: ArgValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgValue::as_i64)
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.get(name).and_then(ArgValue::as_list)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

/// A step that has passed schema validation. Only the validator constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStep {
    step_id: i64,
    schema: &'static ActionSchema,
    args: ValidatedArgs,
}

impl ValidatedStep {
    pub(crate) fn new(step_id: i64, schema: &'static ActionSchema, args: ValidatedArgs) -> Self {
        Self {
            step_id,
            schema,
            args,
        }
    }

    pub fn step_id(&self) -> i64 {
        self.step_id
    }

    pub fn agent(&self) -> AgentKind {
        self.schema.agent
    }

    pub fn action(&self) -> &'static str {
        self.schema.action
    }

    pub fn action_id(&self) -> ActionId {
        self.schema.id
    }

    pub fn schema(&self) -> &'static ActionSchema {
        self.schema
    }

    pub fn args(&self) -> &ValidatedArgs {
        &self.args
    }
}

impl Serialize for ValidatedStep {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("ValidatedStep", 4)?;
        state.serialize_field("step_id", &self.step_id)?;
        state.serialize_field("agent", &self.schema.agent)?;
        state.serialize_field("action", self.schema.action)?;
        state.serialize_field("args", &self.args)?;
        state.end()
    }
}
