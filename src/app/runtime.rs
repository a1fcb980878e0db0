use crate::agents::{
    AgentBindings, AwsAgent, EntraAgent, GithubAgent, JenkinsAgent, JiraAgent,
};
use crate::capability::CapabilityRegistry;
use crate::config::{SecretBackend, Settings};
use crate::credentials::{
    AwsSsmSecretStore, CredentialSource, FileSecretStore, JenkinsCrumbIssuer, SecretStore,
};
use crate::identity::{EntraConfig, EntraIdentityIssuer, IdentityIssuer};
use crate::onboarding::{
    OnboardingDelays, OnboardingFlow, OnboardingPolicy, OnboardingService, OutboxNotifier,
    StoreError, UserStore,
};
use crate::orchestration::{
    ArgumentSanitizer, ExecutionEngine, PlanValidator, TaskOrchestrator, TraceStore,
};
use crate::pipeline::{JenkinsPipeline, ProvisioningClient};
use crate::planning::{AdmissionGate, HttpPlanner, HttpPlannerConfig};
use crate::shared::logging::EventLog;
use std::sync::Arc;
use std::time::Duration;

/// Builds the production collaborators from validated settings.
#[derive(Debug, Clone)]
pub struct AppRuntime {
    settings: Settings,
    log: EventLog,
    /// One planning slot for every orchestrator built from this runtime.
    admission: Arc<AdmissionGate>,
}

impl AppRuntime {
    pub fn new(settings: Settings) -> Self {
        let log = EventLog::new(settings.log_path());
        Self {
            settings,
            log,
            admission: Arc::new(AdmissionGate::single()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn trace_store(&self) -> TraceStore {
        TraceStore::new(self.settings.traces_dir())
    }

    pub fn user_store(&self) -> Result<UserStore, StoreError> {
        UserStore::open(&self.settings.users_db_path())
    }

    fn secret_store(&self) -> Arc<dyn SecretStore> {
        let secrets = &self.settings.secrets;
        match secrets.backend {
            SecretBackend::AwsSsm => {
                let mut store =
                    AwsSsmSecretStore::new(&self.settings.aws.cli_binary, &self.settings.aws.region)
                        .with_profile(self.settings.aws.profile.clone());
                store.timeout = Duration::from_secs(secrets.timeout_seconds);
                Arc::new(store)
            }
            SecretBackend::File => Arc::new(FileSecretStore::new(self.settings.secrets_dir())),
        }
    }

    pub fn credential_source(&self) -> CredentialSource {
        let pipeline = &self.settings.pipeline;
        let issuer = JenkinsCrumbIssuer::new(
            &pipeline.base_url,
            Duration::from_secs(pipeline.request_timeout_seconds),
        );
        CredentialSource::new(
            self.secret_store(),
            Arc::new(issuer),
            &self.settings.secrets.pipeline_secret,
        )
        .with_event_log(self.log.clone())
    }

    pub fn provisioning_client(&self) -> ProvisioningClient {
        let pipeline = &self.settings.pipeline;
        let trigger = JenkinsPipeline::new(
            &pipeline.base_url,
            Duration::from_secs(pipeline.request_timeout_seconds),
        )
        .with_max_authorization_age(Duration::from_secs(pipeline.max_authorization_age_seconds))
        .with_event_log(self.log.clone());
        ProvisioningClient::new(
            Arc::new(trigger),
            self.credential_source(),
            pipeline.job_path.trim_matches('/'),
        )
        .with_cc_email(pipeline.cc_email.clone())
    }

    pub fn identity_issuer(&self) -> Arc<dyn IdentityIssuer> {
        let entra = &self.settings.entra;
        let config = EntraConfig {
            tenant_id: entra.tenant_id.clone(),
            client_id: entra.client_id.clone(),
            client_secret_env: entra.client_secret_env.clone(),
            domain: entra.domain.clone(),
            graph_base: entra.graph_base.clone(),
            login_base: entra.login_base.clone(),
            timeout: Duration::from_secs(self.settings.execution.agent_timeout_seconds),
        };
        Arc::new(EntraIdentityIssuer::new(config).with_event_log(self.log.clone()))
    }

    pub fn agent_bindings(&self) -> AgentBindings {
        let settings = &self.settings;
        let timeout = Duration::from_secs(settings.execution.agent_timeout_seconds);
        AgentBindings::new()
            .bind(Arc::new(
                GithubAgent::new(&settings.github.api_base, timeout)
                    .with_token_env(settings.github.token_env.clone()),
            ))
            .bind(Arc::new(JiraAgent::new(
                &settings.jira.base_url,
                &settings.jira.username_env,
                &settings.jira.token_env,
                timeout,
            )))
            .bind(Arc::new(
                AwsAgent::new(&settings.aws.cli_binary, &settings.aws.region, timeout)
                    .with_profile(settings.aws.profile.clone()),
            ))
            .bind(Arc::new(JenkinsAgent::new(self.provisioning_client())))
            .bind(Arc::new(EntraAgent::new(self.identity_issuer())))
    }

    pub fn orchestrator(&self) -> TaskOrchestrator {
        let settings = &self.settings;
        let registry = CapabilityRegistry::builtin();
        let planner_settings = &settings.planner;
        let config = HttpPlannerConfig {
            api_base: planner_settings.api_base.clone(),
            model: planner_settings.model.clone(),
            api_key_env: planner_settings.api_key_env.clone(),
            timeout: Duration::from_secs(planner_settings.timeout_seconds),
            plan_max_tokens: planner_settings.plan_max_tokens,
            synthesis_max_tokens: planner_settings.synthesis_max_tokens,
            summary_budget: settings.execution.summary_budget_chars,
        };
        let planner = HttpPlanner::new(config, &registry).with_event_log(self.log.clone());
        let engine = ExecutionEngine::new(
            self.agent_bindings(),
            ArgumentSanitizer::new(&settings.execution.allowed_hosts),
        )
        .with_summary_budget(settings.execution.summary_budget_chars)
        .with_event_log(self.log.clone());

        TaskOrchestrator::new(
            Arc::new(planner),
            PlanValidator::new(registry),
            engine,
            Arc::clone(&self.admission),
            self.trace_store(),
        )
        .with_event_log(self.log.clone())
    }

    pub fn onboarding_policy(&self) -> OnboardingPolicy {
        let onboarding = &self.settings.onboarding;
        OnboardingPolicy {
            identity_contact: onboarding.identity_contact.clone(),
            provisioning_contact: onboarding.provisioning_contact.clone(),
            aws_iam_user_group: onboarding.aws_iam_user_group.clone(),
            github_team: onboarding.github_team.clone(),
            supported_services: onboarding.supported_services.clone(),
        }
    }

    pub fn onboarding_service(&self) -> Result<OnboardingService, StoreError> {
        let flow = OnboardingFlow::new(
            self.user_store()?,
            self.identity_issuer(),
            self.provisioning_client(),
            Arc::new(OutboxNotifier::new(self.settings.outbox_dir())),
            self.onboarding_policy(),
        )
        .with_event_log(self.log.clone());
        let onboarding = &self.settings.onboarding;
        let delays = OnboardingDelays {
            issuance: Duration::from_secs(onboarding.issuance_delay_seconds),
            provisioning: Duration::from_secs(onboarding.provisioning_delay_seconds),
        };
        Ok(OnboardingService::new(flow, delays).with_event_log(self.log.clone()))
    }
}
