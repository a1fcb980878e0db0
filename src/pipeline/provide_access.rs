use super::{PipelineAck, PipelineError, PipelineRequest, PipelineTrigger};
use crate::capability::SUPPORTED_SERVICES;
use crate::credentials::{CredentialError, CredentialSource};
use std::sync::Arc;

/// Maps a free-form service name onto the pipeline's canonical spelling.
pub fn canonical_service(name: &str) -> Option<&'static str> {
    let trimmed = name.trim();
    SUPPORTED_SERVICES
        .iter()
        .copied()
        .find(|service| service.eq_ignore_ascii_case(trimmed))
}

/// Parameters of the access-provisioning pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvideAccessParams {
    pub user_email: String,
    pub services: Vec<String>,
    pub cc_email: Option<String>,
    pub aws_iam_user_group: Option<String>,
    pub github_team: Option<String>,
    pub env_name: Option<String>,
}

impl ProvideAccessParams {
    pub fn new(user_email: impl Into<String>, services: &[String]) -> Self {
        let mut normalized: Vec<String> = services
            .iter()
            .filter_map(|service| canonical_service(service))
            .map(str::to_string)
            .collect();
        normalized.sort();
        normalized.dedup();
        Self {
            user_email: user_email.into(),
            services: normalized,
            ..Self::default()
        }
    }

    /// The job reads `Option` as one comma-separated choice string and expects
    /// the address under both `userEmail` and `useremail`.
    pub fn to_request(&self, target: &str) -> PipelineRequest {
        let mut request = PipelineRequest::new(target)
            .param("Option", self.services.join(","))
            .param("userEmail", self.user_email.as_str())
            .param("useremail", self.user_email.as_str());
        if let Some(cc) = &self.cc_email {
            request = request.param("cc_email", cc.as_str());
        }
        if let Some(group) = &self.aws_iam_user_group {
            request = request.param("awsIAMUserGroup", group.as_str());
        }
        if let Some(team) = &self.github_team {
            request = request.param("githubTeam", team.as_str());
        }
        if let Some(env) = &self.env_name {
            request = request.param("envName", env.as_str());
        }
        request
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("no services to provision")]
    NoServices,
    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Runs the access-provisioning pipeline. Every call obtains its own
/// authorization, so a rotated secret or expired crumb never leaks into a
/// later trigger.
#[derive(Clone)]
pub struct ProvisioningClient {
    trigger: Arc<dyn PipelineTrigger>,
    credentials: CredentialSource,
    target: String,
    cc_email: Option<String>,
}

impl ProvisioningClient {
    pub fn new(
        trigger: Arc<dyn PipelineTrigger>,
        credentials: CredentialSource,
        target: impl Into<String>,
    ) -> Self {
        Self {
            trigger,
            credentials,
            target: target.into(),
            cc_email: None,
        }
    }

    /// A configured cc address replaces whatever the caller supplied.
    pub fn with_cc_email(mut self, cc_email: Option<String>) -> Self {
        self.cc_email = cc_email.filter(|cc| !cc.trim().is_empty());
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn provide_access(
        &self,
        params: &ProvideAccessParams,
    ) -> Result<PipelineAck, ProvisionError> {
        if params.services.is_empty() {
            return Err(ProvisionError::NoServices);
        }
        let mut params = params.clone();
        if self.cc_email.is_some() {
            params.cc_email = self.cc_email.clone();
        }
        let authorization = self.credentials.obtain_authorization()?;
        let request = params.to_request(&self.target);
        Ok(self.trigger.trigger(&request, authorization)?)
    }
}

impl std::fmt::Debug for ProvisioningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningClient")
            .field("target", &self.target)
            .field("cc_email", &self.cc_email)
            .finish_non_exhaustive()
    }
}
