use super::{CredentialError, SecretMaterial, SecretStore};
use crate::shared::command::{run_command, CommandSpec};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Parses `{"username"|"user": .., "password"|"token": ..}`.
pub fn parse_secret_blob(name: &str, raw: &str) -> Result<SecretMaterial, CredentialError> {
    let malformed = |reason: String| CredentialError::MalformedSecret {
        name: name.to_string(),
        reason,
    };
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|err| malformed(format!("invalid JSON: {err}")))?;
    let Value::Object(map) = value else {
        return Err(malformed("expected a JSON object".to_string()));
    };
    let pick = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|value| !value.trim().is_empty())
            .map(str::to_string)
    };
    let username = pick(&["username", "user"]);
    let password = pick(&["password", "token"]);
    match (username, password) {
        (Some(username), Some(password)) => Ok(SecretMaterial::new(username, password)),
        _ => {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            Err(malformed(format!(
                "expected `username` and `password`; found keys [{}]",
                keys.join(", ")
            )))
        }
    }
}

/// Reads SecureString parameters through the `aws` CLI.
#[derive(Debug, Clone)]
pub struct AwsSsmSecretStore {
    pub cli_binary: String,
    pub region: String,
    pub profile: Option<String>,
    pub timeout: Duration,
}

impl AwsSsmSecretStore {
    pub fn new(cli_binary: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            cli_binary: cli_binary.into(),
            region: region.into(),
            profile: None,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }
}

impl SecretStore for AwsSsmSecretStore {
    fn get_secret(&self, name: &str) -> Result<SecretMaterial, CredentialError> {
        let mut spec = CommandSpec::new(&self.cli_binary, self.timeout).args([
            "ssm",
            "get-parameter",
            "--name",
            name,
            "--with-decryption",
            "--query",
            "Parameter.Value",
            "--output",
            "text",
            "--region",
            self.region.as_str(),
        ]);
        if let Some(profile) = &self.profile {
            spec = spec.arg("--profile").arg(profile.as_str());
        }
        let raw = run_command(&spec).map_err(|err| CredentialError::SecretUnavailable {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
        parse_secret_blob(name, &raw)
    }
}

/// Reads `<dir>/<name>.json` on every call. Used for local runs and tests.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SecretStore for FileSecretStore {
    fn get_secret(&self, name: &str) -> Result<SecretMaterial, CredentialError> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(CredentialError::SecretUnavailable {
                name: name.to_string(),
                reason: "secret names must not contain path separators".to_string(),
            });
        }
        let path = self.dir.join(format!("{name}.json"));
        let raw = fs::read_to_string(&path).map_err(|err| CredentialError::SecretUnavailable {
            name: name.to_string(),
            reason: format!("{}: {err}", path.display()),
        })?;
        parse_secret_blob(name, &raw)
    }
}
