use super::{required_str, Agent, AgentError, AgentOutput};
use crate::capability::{ActionId, AgentKind};
use crate::orchestration::plan::ValidatedArgs;
use crate::pipeline::{PipelineError, ProvideAccessParams, ProvisionError, ProvisioningClient};
use serde_json::json;

/// Starts the access-provisioning pipeline. Holds no credential material;
/// the provisioning client fetches a fresh authorization per trigger.
#[derive(Debug, Clone)]
pub struct JenkinsAgent {
    client: ProvisioningClient,
}

impl JenkinsAgent {
    pub fn new(client: ProvisioningClient) -> Self {
        Self { client }
    }

    fn trigger_provide_access(&self, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        let user_email = required_str(AgentKind::Jenkins, args, "user_email")?;
        let services = args
            .list("services")
            .ok_or_else(|| AgentError::missing(AgentKind::Jenkins, "services"))?;
        let mut params = ProvideAccessParams::new(user_email, services);
        params.cc_email = args.str("cc_email").map(str::to_string);
        params.aws_iam_user_group = args.str("aws_iam_user_group").map(str::to_string);
        params.github_team = args.str("github_team").map(str::to_string);
        params.env_name = args.str("env_name").map(str::to_string);

        let ack = self
            .client
            .provide_access(&params)
            .map_err(provision_error)?;
        Ok(AgentOutput::new(json!({
            "job": self.client.target(),
            "status_code": ack.status_code,
            "queue_url": ack.queue_url,
            "user_email": params.user_email,
            "services": params.services,
        })))
    }
}

impl Agent for JenkinsAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Jenkins
    }

    fn invoke(&self, action: ActionId, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        match action {
            ActionId::TriggerProvideAccess => self.trigger_provide_access(args),
            other => Err(AgentError::UnsupportedAction {
                agent: AgentKind::Jenkins,
                action: other,
            }),
        }
    }
}

fn provision_error(err: ProvisionError) -> AgentError {
    let agent = AgentKind::Jenkins;
    match err {
        ProvisionError::Credentials(err) => AgentError::Credentials {
            agent,
            reason: err.to_string(),
        },
        ProvisionError::Pipeline(PipelineError::Authentication { status, body })
        | ProvisionError::Pipeline(PipelineError::Rejected { status, body }) => {
            AgentError::Status { agent, status, body }
        }
        other => AgentError::Request {
            agent,
            reason: other.to_string(),
        },
    }
}
