pub mod jenkins;
pub mod provide_access;

pub use jenkins::JenkinsPipeline;
pub use provide_access::{
    canonical_service, ProvideAccessParams, ProvisionError, ProvisioningClient,
};

use crate::credentials::Authorization;
use serde::Serialize;

/// A named pipeline and its build parameters, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub target: String,
    pub parameters: Vec<(String, String)>,
}

impl PipelineRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineAck {
    pub status_code: u16,
    pub queue_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline rejected the authorization (status {status})")]
    Authentication { status: u16, body: String },
    #[error("authorization is {age_ms}ms old; obtain a fresh one per call")]
    StaleAuthorization { age_ms: u64 },
    #[error("pipeline rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("pipeline is unreachable: {0}")]
    Transport(String),
}

impl PipelineError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::StaleAuthorization { .. }
        )
    }
}

/// Starts a pipeline run. The authorization is consumed, so one fetched
/// token can back at most one trigger.
pub trait PipelineTrigger: Send + Sync {
    fn trigger(
        &self,
        request: &PipelineRequest,
        authorization: Authorization,
    ) -> Result<PipelineAck, PipelineError>;
}
