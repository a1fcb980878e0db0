//! Credential freshness for the provisioning pipeline.
//!
//! Nothing in this module keeps credential material between calls. Every
//! `CredentialSource::obtain_authorization` re-reads the secret and asks the
//! target system for a new anti-forgery token, and the resulting
//! `Authorization` is neither `Clone` nor reusable: a pipeline trigger takes
//! it by value.

pub mod crumb;
pub mod secret_store;

pub use crumb::JenkinsCrumbIssuer;
pub use secret_store::{parse_secret_blob, AwsSsmSecretStore, FileSecretStore};

use crate::shared::http::basic_auth_value;
use crate::shared::logging::EventLog;
use crate::shared::time::now_millis;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("secret `{name}` could not be read: {reason}")]
    SecretUnavailable { name: String, reason: String },
    #[error("secret `{name}` is malformed: {reason}")]
    MalformedSecret { name: String, reason: String },
    #[error("token endpoint rejected the credentials (status {status})")]
    Authentication { status: u16 },
    #[error("token endpoint is unreachable: {reason}")]
    Unreachable { reason: String },
    #[error("token endpoint returned an unusable response: {reason}")]
    InvalidTokenResponse { reason: String },
}

/// Username and password read from the secret store.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretMaterial {
    pub username: String,
    password: String,
}

impl SecretMaterial {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn basic_auth_header(&self) -> String {
        basic_auth_value(&self.username, &self.password)
    }
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait SecretStore: Send + Sync {
    fn get_secret(&self, name: &str) -> Result<SecretMaterial, CredentialError>;
}

/// Anti-forgery token bound to the session it was issued in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntiForgeryToken {
    pub field: String,
    pub value: String,
    pub session_cookie: Option<String>,
}

pub trait AntiForgeryIssuer: Send + Sync {
    fn issue(&self, secret: &SecretMaterial) -> Result<AntiForgeryToken, CredentialError>;
}

/// Authorization for exactly one pipeline call.
#[derive(Debug)]
pub struct Authorization {
    secret: SecretMaterial,
    anti_forgery: AntiForgeryToken,
    obtained_at: Instant,
    obtained_at_ms: i64,
}

impl Authorization {
    pub fn username(&self) -> &str {
        &self.secret.username
    }

    pub fn session_header(&self) -> String {
        self.secret.basic_auth_header()
    }

    pub fn anti_forgery(&self) -> &AntiForgeryToken {
        &self.anti_forgery
    }

    pub fn obtained_at(&self) -> Instant {
        self.obtained_at
    }

    pub fn obtained_at_ms(&self) -> i64 {
        self.obtained_at_ms
    }

    pub fn age(&self) -> Duration {
        self.obtained_at.elapsed()
    }
}

/// Stateless factory for `Authorization`s.
///
/// Holds only the collaborators and the secret name, never a fetched secret or
/// token, so keeping one inside a long-lived owner cannot serve stale material.
#[derive(Clone)]
pub struct CredentialSource {
    secrets: Arc<dyn SecretStore>,
    issuer: Arc<dyn AntiForgeryIssuer>,
    secret_name: String,
    log: EventLog,
}

impl CredentialSource {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        issuer: Arc<dyn AntiForgeryIssuer>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            issuer,
            secret_name: secret_name.into(),
            log: EventLog::disabled(),
        }
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    pub fn obtain_authorization(&self) -> Result<Authorization, CredentialError> {
        let secret = self
            .secrets
            .get_secret(&self.secret_name)
            .inspect_err(|err| {
                self.log.error(
                    "credentials.secret_failed",
                    format!("secret={} error={err}", self.secret_name),
                )
            })?;
        let anti_forgery = self.issuer.issue(&secret).inspect_err(|err| {
            self.log.error(
                "credentials.token_failed",
                format!("secret={} error={err}", self.secret_name),
            )
        })?;
        self.log.info(
            "credentials.obtained",
            format!(
                "secret={} username={} session_bound={}",
                self.secret_name,
                mask(&secret.username),
                anti_forgery.session_cookie.is_some()
            ),
        );
        Ok(Authorization {
            secret,
            anti_forgery,
            obtained_at: Instant::now(),
            obtained_at_ms: now_millis(),
        })
    }
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSource")
            .field("secret_name", &self.secret_name)
            .finish_non_exhaustive()
    }
}

fn mask(value: &str) -> String {
    let prefix: String = value.chars().take(3).collect();
    format!("{prefix}***")
}
