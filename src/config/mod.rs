pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::load_settings;
pub use paths::{default_global_config_path, GLOBAL_SETTINGS_FILE_NAME, GLOBAL_STATE_DIR};
pub use settings::{
    AwsSettings, EntraSettings, ExecutionSettings, GithubSettings, JiraSettings,
    OnboardingSettings, PipelineSettings, PlannerSettings, SecretBackend, SecretsSettings,
    Settings,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn minimal(state_root: &str) -> Settings {
        serde_yaml::from_str(&format!("state_root: {state_root}\n")).expect("parse settings")
    }

    #[test]
    fn minimal_settings_fill_every_section_with_defaults() {
        let settings = minimal("/var/lib/agentops");
        settings.validate().expect("valid defaults");
        assert_eq!(settings.execution.summary_budget_chars, 1200);
        assert_eq!(settings.aws.region, "us-east-2");
        assert_eq!(settings.secrets.backend, SecretBackend::AwsSsm);
        assert_eq!(settings.onboarding.issuance_delay_seconds, 5);
        assert_eq!(
            settings.onboarding.supported_services,
            vec!["AWS", "Confluence", "Database", "GitHub"]
        );
        assert_eq!(
            settings.traces_dir(),
            PathBuf::from("/var/lib/agentops/traces")
        );
        assert_eq!(
            settings.log_path(),
            PathBuf::from("/var/lib/agentops/logs/agentops.log")
        );
    }

    #[test]
    fn validation_rejects_relative_state_root() {
        let err = minimal("relative/state").validate().expect_err("relative");
        assert!(err.to_string().contains("state_root"));
    }

    #[test]
    fn validation_rejects_zero_budget_and_bad_urls() {
        let mut settings = minimal("/srv/agentops");
        settings.execution.summary_budget_chars = 0;
        assert!(settings.validate().is_err());

        let mut settings = minimal("/srv/agentops");
        settings.pipeline.base_url = "ftp://ci.example.com".to_string();
        let err = settings.validate().expect_err("ftp");
        assert!(err.to_string().contains("pipeline.base_url"));
    }

    #[test]
    fn validation_rejects_unknown_or_empty_services() {
        let mut settings = minimal("/srv/agentops");
        settings.onboarding.supported_services = vec!["Slack".to_string()];
        assert!(settings.validate().is_err());

        settings.onboarding.supported_services.clear();
        assert!(settings.validate().is_err());

        settings.onboarding.supported_services = vec!["aws".to_string()];
        settings.validate().expect("case-insensitive service");
    }

    #[test]
    fn secret_backend_parses_snake_case() {
        let settings: Settings = serde_yaml::from_str(
            r#"
state_root: /srv/agentops
secrets:
  backend: file
  file_dir: /etc/agentops/secrets
"#,
        )
        .expect("parse");
        assert_eq!(settings.secrets.backend, SecretBackend::File);
        assert_eq!(
            settings.secrets_dir(),
            PathBuf::from("/etc/agentops/secrets")
        );
    }

    #[test]
    fn allowed_hosts_gate_only_url_arguments() {
        use crate::capability::{CapabilityRegistry, SanitizePolicy};
        use crate::orchestration::ArgumentSanitizer;

        let settings: Settings = serde_yaml::from_str(
            r#"
state_root: /srv/agentops
execution:
  allowed_hosts: [API.GitHub.com]
"#,
        )
        .expect("parse");
        settings.validate().expect("valid");
        let sanitizer = ArgumentSanitizer::new(&settings.execution.allowed_hosts);
        sanitizer
            .check_value(SanitizePolicy::Url, "https://api.github.com/repos/acme/api")
            .expect("allowed host");
        assert!(sanitizer
            .check_value(SanitizePolicy::Url, "https://example.net/")
            .is_err());
        sanitizer
            .check_value(SanitizePolicy::RepoName, "acme")
            .expect("repo names ignore the host list");

        let registry = CapabilityRegistry::builtin();
        assert!(registry
            .agents()
            .into_iter()
            .flat_map(|agent| registry.actions_for(agent))
            .flat_map(|schema| schema.args.iter())
            .all(|arg| arg.sanitize != SanitizePolicy::Url));
    }

    #[test]
    fn load_settings_reads_explicit_path_and_validates() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.yaml");
        fs::write(&path, "state_root: relative\n").expect("write");
        assert!(matches!(
            load_settings(Some(path.as_path())),
            Err(ConfigError::Settings(_))
        ));

        fs::write(
            &path,
            format!("state_root: {}\n", temp.path().join("state").display()),
        )
        .expect("write");
        let settings = load_settings(Some(path.as_path())).expect("load");
        assert_eq!(settings.state_root, temp.path().join("state"));
    }

    #[test]
    fn default_path_uses_home() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let temp = tempdir().expect("tempdir");
        let previous = std::env::var_os("HOME");
        std::env::set_var("HOME", temp.path());
        let path = default_global_config_path().expect("path");
        match previous {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }
        assert_eq!(path, temp.path().join(".agentops").join("config.yaml"));
    }
}
