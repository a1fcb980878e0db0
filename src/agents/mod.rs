pub mod aws;
pub mod entra;
pub mod github;
pub mod jenkins;
pub mod jira;

pub use aws::AwsAgent;
pub use entra::EntraAgent;
pub use github::GithubAgent;
pub use jenkins::JenkinsAgent;
pub use jira::JiraAgent;

use crate::capability::{ActionId, AgentKind};
use crate::orchestration::plan::ValidatedArgs;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Uniform success envelope returned by every capability implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub data: Value,
    /// Set when the agent itself cut the payload (for example a capped list).
    pub truncated: bool,
    pub warnings: Vec<String>,
}

impl AgentOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            truncated: false,
            warnings: Vec::new(),
        }
    }

    pub fn truncated(mut self, truncated: bool) -> Self {
        self.truncated = self.truncated || truncated;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{agent} does not implement action `{action}`")]
    UnsupportedAction { agent: AgentKind, action: ActionId },
    #[error("{agent} is missing argument `{arg}`")]
    MissingArgument { agent: AgentKind, arg: String },
    #[error("{agent} is not configured: {reason}")]
    NotConfigured { agent: AgentKind, reason: String },
    #[error("{agent} could not obtain credentials: {reason}")]
    Credentials { agent: AgentKind, reason: String },
    #[error("{agent} request failed: {reason}")]
    Request { agent: AgentKind, reason: String },
    #[error("{agent} returned status {status}: {body}")]
    Status {
        agent: AgentKind,
        status: u16,
        body: String,
    },
    #[error("{agent} response could not be parsed: {reason}")]
    Parse { agent: AgentKind, reason: String },
}

impl AgentError {
    pub(crate) fn missing(agent: AgentKind, arg: &str) -> Self {
        Self::MissingArgument {
            agent,
            arg: arg.to_string(),
        }
    }

    pub(crate) fn from_http(agent: AgentKind, failure: crate::shared::http::HttpFailure) -> Self {
        match failure {
            crate::shared::http::HttpFailure::Status { status, body } => {
                Self::Status { agent, status, body }
            }
            crate::shared::http::HttpFailure::Transport(reason) => Self::Request { agent, reason },
        }
    }
}

/// One capability implementation. Dispatch is by `ActionId`, never by string.
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    fn invoke(&self, action: ActionId, args: &ValidatedArgs) -> Result<AgentOutput, AgentError>;
}

/// Agent implementations bound to each kind for the lifetime of an engine.
#[derive(Clone, Default)]
pub struct AgentBindings {
    agents: BTreeMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(agent.kind(), agent);
        self
    }

    pub fn get(&self, kind: AgentKind) -> Option<&dyn Agent> {
        self.agents.get(&kind).map(|agent| agent.as_ref())
    }

    pub fn bound_kinds(&self) -> Vec<AgentKind> {
        self.agents.keys().copied().collect()
    }
}

impl std::fmt::Debug for AgentBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBindings")
            .field("agents", &self.bound_kinds())
            .finish()
    }
}

pub(crate) fn required_str<'a>(
    agent: AgentKind,
    args: &'a ValidatedArgs,
    name: &str,
) -> Result<&'a str, AgentError> {
    args.str(name).ok_or_else(|| AgentError::missing(agent, name))
}

/// Applies the agent-side page cap. Returns the effective limit and whether
/// the request was narrowed.
pub(crate) fn capped_limit(requested: Option<i64>, default: u32, max: u32) -> (u32, bool) {
    match requested {
        None => (default, false),
        Some(value) if value < 1 => (1, false),
        Some(value) if value > i64::from(max) => (max, true),
        Some(value) => (value as u32, false),
    }
}
