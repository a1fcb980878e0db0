use super::naming::{company_email, display_name, generate_password, principal_name};
use super::{IdentityError, IdentityIssuer, IdentityRequest, IssuedIdentity};
use crate::shared::http::{bearer_value, classify_error, http_agent, join_url, HttpFailure};
use crate::shared::logging::EventLog;
use serde_json::{json, Value};
use std::time::Duration;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntraConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret_env: String,
    pub domain: String,
    pub graph_base: String,
    pub login_base: String,
    pub timeout: Duration,
}

/// Creates directory users through Microsoft Graph. A client-credentials
/// token is requested for every issuance and never cached.
#[derive(Debug, Clone)]
pub struct EntraIdentityIssuer {
    config: EntraConfig,
    log: EventLog,
}

impl EntraIdentityIssuer {
    pub fn new(config: EntraConfig) -> Self {
        Self {
            config,
            log: EventLog::disabled(),
        }
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    fn access_token(&self) -> Result<String, IdentityError> {
        let secret = std::env::var(&self.config.client_secret_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                IdentityError::NotConfigured(format!(
                    "environment variable {} is not set",
                    self.config.client_secret_env
                ))
            })?;
        let url = join_url(
            &self.config.login_base,
            &format!("{}/oauth2/v2.0/token", self.config.tenant_id),
        );
        let response = http_agent(self.config.timeout)
            .post(&url)
            .send_form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", secret.as_str()),
                ("scope", GRAPH_SCOPE),
            ])
            .map_err(|err| IdentityError::Token(classify_error(err).to_string()))?;
        let body: Value = response
            .into_json()
            .map_err(|err| IdentityError::Token(err.to_string()))?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| IdentityError::Token("response has no access_token".to_string()))
    }
}

impl IdentityIssuer for EntraIdentityIssuer {
    fn issue(&self, request: &IdentityRequest) -> Result<IssuedIdentity, IdentityError> {
        if request.firstname.trim().is_empty() || request.lastname.trim().is_empty() {
            return Err(IdentityError::InvalidName(format!(
                "{} {}",
                request.firstname, request.lastname
            )));
        }
        let email = company_email(&request.firstname, &request.lastname, &self.config.domain);
        let principal = principal_name(&request.firstname, &request.lastname);
        let display = display_name(
            request.full_name.as_deref(),
            &request.firstname,
            &request.lastname,
        );

        let token = match self.access_token() {
            Ok(token) => token,
            Err(err) => {
                self.log.error("identity.token_failed", err.to_string());
                return Err(err);
            }
        };
        let password =
            generate_password(16).map_err(|err| IdentityError::Random(err.to_string()))?;
        let payload = json!({
            "accountEnabled": true,
            "displayName": display,
            "mailNickname": principal,
            "userPrincipalName": email,
            "passwordProfile": {
                "password": password,
                "forceChangePasswordNextSignIn": true,
            },
        });

        let url = join_url(&self.config.graph_base, "users");
        let result = http_agent(self.config.timeout)
            .post(&url)
            .set("Authorization", &bearer_value(&token))
            .send_json(payload);
        match result {
            Ok(response) => {
                let created: Value = response.into_json().unwrap_or(Value::Null);
                let object_id = created.get("id").and_then(Value::as_str).map(str::to_string);
                self.log.info(
                    "identity.issued",
                    format!("email={email} object_id={}", object_id.as_deref().unwrap_or("-")),
                );
                Ok(IssuedIdentity {
                    email,
                    principal_name: principal,
                    display_name: display,
                    object_id,
                })
            }
            Err(err) => {
                let err = match classify_error(err) {
                    HttpFailure::Status { status, body } => IdentityError::Rejected {
                        status,
                        message: graph_error_message(&body),
                    },
                    HttpFailure::Transport(reason) => IdentityError::Transport(reason),
                };
                self.log
                    .error("identity.issue_failed", format!("email={email} error={err}"));
                Err(err)
            }
        }
    }
}

/// Graph wraps failures as `{"error": {"message": ...}}`.
fn graph_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
