use super::{required_str, Agent, AgentError, AgentOutput};
use crate::capability::{ActionId, AgentKind};
use crate::identity::{IdentityError, IdentityIssuer, IdentityRequest};
use crate::orchestration::plan::ValidatedArgs;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct EntraAgent {
    issuer: Arc<dyn IdentityIssuer>,
}

impl EntraAgent {
    pub fn new(issuer: Arc<dyn IdentityIssuer>) -> Self {
        Self { issuer }
    }
}

impl Agent for EntraAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Entra
    }

    fn invoke(&self, action: ActionId, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        if action != ActionId::GenerateCompanyEmail {
            return Err(AgentError::UnsupportedAction {
                agent: AgentKind::Entra,
                action,
            });
        }
        let mut request = IdentityRequest::new(
            required_str(AgentKind::Entra, args, "firstname")?,
            required_str(AgentKind::Entra, args, "lastname")?,
        );
        if let Some(full_name) = args.str("full_name") {
            request = request.with_full_name(full_name);
        }
        let issued = self.issuer.issue(&request).map_err(|err| match err {
            IdentityError::NotConfigured(reason) => AgentError::NotConfigured {
                agent: AgentKind::Entra,
                reason,
            },
            IdentityError::Rejected { status, message } => AgentError::Status {
                agent: AgentKind::Entra,
                status,
                body: message,
            },
            other => AgentError::Request {
                agent: AgentKind::Entra,
                reason: other.to_string(),
            },
        })?;
        Ok(AgentOutput::new(json!({
            "email": issued.email,
            "principal_name": issued.principal_name,
            "display_name": issued.display_name,
        })))
    }
}

impl std::fmt::Debug for EntraAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntraAgent").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IssuedIdentity;
    use crate::orchestration::plan::ArgValue;

    struct Fixed;

    impl IdentityIssuer for Fixed {
        fn issue(&self, request: &IdentityRequest) -> Result<IssuedIdentity, IdentityError> {
            Ok(IssuedIdentity {
                email: format!("{}.{}@corp.example.com", request.firstname, request.lastname)
                    .to_lowercase(),
                principal_name: "jane_doe".to_string(),
                display_name: request.full_name.clone().unwrap_or_default(),
                object_id: Some("obj-1".to_string()),
            })
        }
    }

    #[test]
    fn issues_email_without_leaking_object_ids() {
        let agent = EntraAgent::new(Arc::new(Fixed));
        let mut args = ValidatedArgs::default();
        args.insert("firstname", ArgValue::String("Jane".to_string()));
        args.insert("lastname", ArgValue::String("Doe".to_string()));
        args.insert("full_name", ArgValue::String("Jane Doe".to_string()));
        let output = agent
            .invoke(ActionId::GenerateCompanyEmail, &args)
            .expect("issue");
        assert_eq!(
            output.data,
            json!({"email": "jane.doe@corp.example.com", "principal_name": "jane_doe", "display_name": "Jane Doe"})
        );
    }
}
