use super::prompts::{
    plan_user_prompt, strip_code_fence, synthesis_user_prompt, PLAN_SYSTEM_PROMPT,
    SYNTHESIS_SYSTEM_PROMPT,
};
use super::{parse_synthesis, PlannerError, PlanningCollaborator, Synthesis};
use crate::capability::CapabilityRegistry;
use crate::orchestration::engine::{TraceEntry, DEFAULT_SUMMARY_BUDGET};
use crate::orchestration::plan::ValidatedStep;
use crate::shared::http::{bearer_value, classify_error, http_agent, join_url, HttpFailure};
use crate::shared::logging::EventLog;
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpPlannerConfig {
    pub api_base: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout: Duration,
    pub plan_max_tokens: u32,
    pub synthesis_max_tokens: u32,
    pub summary_budget: usize,
}

impl Default for HttpPlannerConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout: Duration::from_secs(60),
            plan_max_tokens: 800,
            synthesis_max_tokens: 1200,
            summary_budget: DEFAULT_SUMMARY_BUDGET,
        }
    }
}

/// OpenAI-compatible chat-completions planner.
#[derive(Debug, Clone)]
pub struct HttpPlanner {
    config: HttpPlannerConfig,
    catalog: Value,
    log: EventLog,
}

impl HttpPlanner {
    pub fn new(config: HttpPlannerConfig, registry: &CapabilityRegistry) -> Self {
        Self {
            config,
            catalog: registry.describe(),
            log: EventLog::disabled(),
        }
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<Value, PlannerError> {
        let api_key = std::env::var(&self.config.api_key_env).map_err(|_| {
            PlannerError::MissingApiKey {
                env: self.config.api_key_env.clone(),
            }
        })?;
        let body = json!({
            "model": self.config.model,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });
        self.log.info(
            "planner.request",
            format!(
                "model={} user_prompt_chars={} max_tokens={max_tokens}",
                self.config.model,
                user_prompt.chars().count()
            ),
        );

        let response = http_agent(self.config.timeout)
            .post(&join_url(&self.config.api_base, "chat/completions"))
            .set("Authorization", &bearer_value(&api_key))
            .send_json(body)
            .map_err(|err| match classify_error(err) {
                HttpFailure::Status { status, body } => PlannerError::Status { status, body },
                HttpFailure::Transport(reason) => PlannerError::Transport(reason),
            })?;
        let payload: Value = response
            .into_json()
            .map_err(|err| PlannerError::Malformed(format!("invalid completion body: {err}")))?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PlannerError::Malformed("completion has no message content".to_string())
            })?;
        serde_json::from_str(strip_code_fence(content))
            .map_err(|err| PlannerError::Malformed(format!("message content is not JSON: {err}")))
    }
}

impl PlanningCollaborator for HttpPlanner {
    fn plan(&self, task: &str, context: &Map<String, Value>) -> Result<Value, PlannerError> {
        let prompt = plan_user_prompt(task, context, &self.catalog);
        self.complete(
            PLAN_SYSTEM_PROMPT,
            &prompt,
            0.0,
            self.config.plan_max_tokens,
        )
    }

    fn synthesize(
        &self,
        task: &str,
        plan: &[ValidatedStep],
        trace: &[TraceEntry],
    ) -> Result<Synthesis, PlannerError> {
        let prompt = synthesis_user_prompt(task, plan, trace, self.config.summary_budget);
        let value = self.complete(
            SYNTHESIS_SYSTEM_PROMPT,
            &prompt,
            0.1,
            self.config.synthesis_max_tokens,
        )?;
        parse_synthesis(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_fails_before_any_request() {
        let planner = HttpPlanner::new(
            HttpPlannerConfig {
                api_key_env: "AGENTOPS_TEST_UNSET_PLANNER_KEY".to_string(),
                api_base: "http://127.0.0.1:9".to_string(),
                ..HttpPlannerConfig::default()
            },
            &CapabilityRegistry::builtin(),
        );
        let err = planner.plan("list buckets", &Map::new()).expect_err("no key");
        assert!(matches!(err, PlannerError::MissingApiKey { ref env } if env == "AGENTOPS_TEST_UNSET_PLANNER_KEY"));
    }

    #[test]
    fn catalog_is_captured_from_registry() {
        let planner = HttpPlanner::new(HttpPlannerConfig::default(), &CapabilityRegistry::builtin());
        assert!(planner.catalog.get("GithubAgent").is_some());
    }
}
