use super::ConfigError;
use crate::capability::SUPPORTED_SERVICES;
use crate::orchestration::sanitize::parse_http_url;
use crate::pipeline::canonical_service;
use crate::shared::logging::event_log_path;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub state_root: PathBuf,
    #[serde(default)]
    pub planner: PlannerSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub github: GithubSettings,
    #[serde(default)]
    pub jira: JiraSettings,
    #[serde(default)]
    pub aws: AwsSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub entra: EntraSettings,
    #[serde(default)]
    pub secrets: SecretsSettings,
    #[serde(default)]
    pub onboarding: OnboardingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerSettings {
    #[serde(default = "default_planner_api_base")]
    pub api_base: String,
    #[serde(default = "default_planner_model")]
    pub model: String,
    #[serde(default = "default_planner_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_planner_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_plan_max_tokens")]
    pub plan_max_tokens: u32,
    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            api_base: default_planner_api_base(),
            model: default_planner_model(),
            api_key_env: default_planner_api_key_env(),
            timeout_seconds: default_planner_timeout_seconds(),
            plan_max_tokens: default_plan_max_tokens(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_summary_budget_chars")]
    pub summary_budget_chars: usize,
    #[serde(default = "default_agent_timeout_seconds")]
    pub agent_timeout_seconds: u64,
    /// Hosts accepted for URL-typed action arguments. Other argument kinds
    /// never consult this list.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            summary_budget_chars: default_summary_budget_chars(),
            agent_timeout_seconds: default_agent_timeout_seconds(),
            allowed_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubSettings {
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: Option<String>,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            token_env: default_github_token_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JiraSettings {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_jira_username_env")]
    pub username_env: String,
    #[serde(default = "default_jira_token_env")]
    pub token_env: String,
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username_env: default_jira_username_env(),
            token_env: default_jira_token_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AwsSettings {
    #[serde(default = "default_aws_cli_binary")]
    pub cli_binary: String,
    #[serde(default = "default_aws_region")]
    pub region: String,
    #[serde(default)]
    pub profile: Option<String>,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            cli_binary: default_aws_cli_binary(),
            region: default_aws_region(),
            profile: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSettings {
    #[serde(default = "default_pipeline_base_url")]
    pub base_url: String,
    #[serde(default = "default_pipeline_job_path")]
    pub job_path: String,
    #[serde(default)]
    pub cc_email: Option<String>,
    #[serde(default = "default_pipeline_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_authorization_age_seconds")]
    pub max_authorization_age_seconds: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            base_url: default_pipeline_base_url(),
            job_path: default_pipeline_job_path(),
            cc_email: None,
            request_timeout_seconds: default_pipeline_timeout_seconds(),
            max_authorization_age_seconds: default_max_authorization_age_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntraSettings {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_entra_secret_env")]
    pub client_secret_env: String,
    #[serde(default = "default_entra_domain")]
    pub domain: String,
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    #[serde(default = "default_login_base")]
    pub login_base: String,
}

impl Default for EntraSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret_env: default_entra_secret_env(),
            domain: default_entra_domain(),
            graph_base: default_graph_base(),
            login_base: default_login_base(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    #[default]
    AwsSsm,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecretsSettings {
    #[serde(default)]
    pub backend: SecretBackend,
    #[serde(default = "default_pipeline_secret")]
    pub pipeline_secret: String,
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
    #[serde(default = "default_secret_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for SecretsSettings {
    fn default() -> Self {
        Self {
            backend: SecretBackend::default(),
            pipeline_secret: default_pipeline_secret(),
            file_dir: None,
            timeout_seconds: default_secret_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OnboardingSettings {
    #[serde(default = "default_stage_delay_seconds")]
    pub issuance_delay_seconds: u64,
    #[serde(default = "default_stage_delay_seconds")]
    pub provisioning_delay_seconds: u64,
    #[serde(default = "default_identity_contact")]
    pub identity_contact: String,
    #[serde(default = "default_provisioning_contact")]
    pub provisioning_contact: String,
    #[serde(default = "default_supported_services")]
    pub supported_services: Vec<String>,
    #[serde(default)]
    pub aws_iam_user_group: Option<String>,
    #[serde(default)]
    pub github_team: Option<String>,
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self {
            issuance_delay_seconds: default_stage_delay_seconds(),
            provisioning_delay_seconds: default_stage_delay_seconds(),
            identity_contact: default_identity_contact(),
            provisioning_contact: default_provisioning_contact(),
            supported_services: default_supported_services(),
            aws_iam_user_group: None,
            github_team: None,
        }
    }
}

fn default_planner_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_planner_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_planner_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_planner_timeout_seconds() -> u64 {
    60
}

fn default_plan_max_tokens() -> u32 {
    800
}

fn default_synthesis_max_tokens() -> u32 {
    1200
}

fn default_summary_budget_chars() -> usize {
    1200
}

fn default_agent_timeout_seconds() -> u64 {
    30
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_github_token_env() -> Option<String> {
    Some("GITHUB_TOKEN".to_string())
}

fn default_jira_username_env() -> String {
    "JIRA_USERNAME".to_string()
}

fn default_jira_token_env() -> String {
    "JIRA_API_TOKEN".to_string()
}

fn default_aws_cli_binary() -> String {
    "aws".to_string()
}

fn default_aws_region() -> String {
    "us-east-2".to_string()
}

fn default_pipeline_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_pipeline_job_path() -> String {
    "job/ProvideAccess".to_string()
}

fn default_pipeline_timeout_seconds() -> u64 {
    30
}

fn default_max_authorization_age_seconds() -> u64 {
    60
}

fn default_entra_secret_env() -> String {
    "ENTRA_CLIENT_SECRET".to_string()
}

fn default_entra_domain() -> String {
    "example.onmicrosoft.com".to_string()
}

fn default_graph_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_login_base() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_pipeline_secret() -> String {
    "jenkins".to_string()
}

fn default_secret_timeout_seconds() -> u64 {
    15
}

fn default_stage_delay_seconds() -> u64 {
    5
}

fn default_identity_contact() -> String {
    "it-ops@example.com".to_string()
}

fn default_provisioning_contact() -> String {
    "access-ops@example.com".to_string()
}

fn default_supported_services() -> Vec<String> {
    SUPPORTED_SERVICES.iter().map(|s| s.to_string()).collect()
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    parse_http_url(value)
        .map(|_| ())
        .map_err(|err| ConfigError::Settings(format!("`{field}`: {err}")))
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.state_root.is_absolute() {
            return Err(ConfigError::Settings(
                "`state_root` must be an absolute path".to_string(),
            ));
        }
        if self.execution.summary_budget_chars == 0 {
            return Err(ConfigError::Settings(
                "`execution.summary_budget_chars` must be > 0".to_string(),
            ));
        }
        if self.execution.agent_timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "`execution.agent_timeout_seconds` must be > 0".to_string(),
            ));
        }
        if self
            .execution
            .allowed_hosts
            .iter()
            .any(|host| host.trim().is_empty())
        {
            return Err(ConfigError::Settings(
                "`execution.allowed_hosts` entries must be non-empty".to_string(),
            ));
        }

        check_url("planner.api_base", &self.planner.api_base)?;
        if self.planner.model.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`planner.model` must be non-empty".to_string(),
            ));
        }
        if self.planner.timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "`planner.timeout_seconds` must be > 0".to_string(),
            ));
        }
        check_url("github.api_base", &self.github.api_base)?;
        if !self.jira.base_url.trim().is_empty() {
            check_url("jira.base_url", &self.jira.base_url)?;
        }
        if self.aws.region.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`aws.region` must be non-empty".to_string(),
            ));
        }

        check_url("pipeline.base_url", &self.pipeline.base_url)?;
        if self.pipeline.job_path.trim().trim_matches('/').is_empty() {
            return Err(ConfigError::Settings(
                "`pipeline.job_path` must be non-empty".to_string(),
            ));
        }
        if self.pipeline.request_timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "`pipeline.request_timeout_seconds` must be > 0".to_string(),
            ));
        }
        if self.pipeline.max_authorization_age_seconds == 0 {
            return Err(ConfigError::Settings(
                "`pipeline.max_authorization_age_seconds` must be > 0".to_string(),
            ));
        }

        check_url("entra.graph_base", &self.entra.graph_base)?;
        check_url("entra.login_base", &self.entra.login_base)?;
        if self.entra.domain.trim().is_empty() || self.entra.domain.contains('@') {
            return Err(ConfigError::Settings(
                "`entra.domain` must be a bare domain".to_string(),
            ));
        }

        if self.secrets.pipeline_secret.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`secrets.pipeline_secret` must be non-empty".to_string(),
            ));
        }
        if let Some(dir) = &self.secrets.file_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Settings(
                    "`secrets.file_dir` must be an absolute path".to_string(),
                ));
            }
        }

        if self.onboarding.supported_services.is_empty() {
            return Err(ConfigError::Settings(
                "`onboarding.supported_services` must be non-empty".to_string(),
            ));
        }
        for service in &self.onboarding.supported_services {
            if canonical_service(service).is_none() {
                return Err(ConfigError::Settings(format!(
                    "`onboarding.supported_services` entry `{service}` is not one of {}",
                    SUPPORTED_SERVICES.join(", ")
                )));
            }
        }
        for (field, contact) in [
            ("onboarding.identity_contact", &self.onboarding.identity_contact),
            (
                "onboarding.provisioning_contact",
                &self.onboarding.provisioning_contact,
            ),
        ] {
            if !contact.contains('@') {
                return Err(ConfigError::Settings(format!(
                    "`{field}` must be an email address"
                )));
            }
        }
        Ok(())
    }

    pub fn traces_dir(&self) -> PathBuf {
        self.state_root.join("traces")
    }

    pub fn log_path(&self) -> PathBuf {
        event_log_path(&self.state_root)
    }

    pub fn users_db_path(&self) -> PathBuf {
        self.state_root.join("db").join("users.sqlite")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.state_root.join("outbox")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.secrets
            .file_dir
            .clone()
            .unwrap_or_else(|| self.state_root.join("secrets"))
    }
}
