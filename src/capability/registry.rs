use super::{ActionSchema, AgentKind, CATALOG};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("agent `{0}` is not registered")]
    UnknownAgent(String),
    #[error("action `{action}` is not registered for `{agent}`")]
    UnknownAction { agent: AgentKind, action: String },
}

/// Read-only view over a static action catalog.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRegistry {
    actions: &'static [ActionSchema],
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CapabilityRegistry {
    pub fn builtin() -> Self {
        Self { actions: CATALOG }
    }

    pub fn from_catalog(actions: &'static [ActionSchema]) -> Self {
        Self { actions }
    }

    pub fn lookup(&self, agent: &str, action: &str) -> Result<&'static ActionSchema, LookupError> {
        let kind = AgentKind::parse(agent)
            .filter(|kind| self.actions_for(*kind).next().is_some())
            .ok_or_else(|| LookupError::UnknownAgent(agent.to_string()))?;
        self.actions_for(kind)
            .find(|schema| schema.action == action)
            .ok_or_else(|| LookupError::UnknownAction {
                agent: kind,
                action: action.to_string(),
            })
    }

    pub fn actions_for(&self, agent: AgentKind) -> impl Iterator<Item = &'static ActionSchema> {
        let actions: &'static [ActionSchema] = self.actions;
        actions.iter().filter(move |schema| schema.agent == agent)
    }

    pub fn agents(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.actions.iter().map(|schema| schema.agent).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Catalog rendering embedded in the planner prompt and printed by `agentops agents`.
    pub fn describe(&self) -> Value {
        let mut agents = Map::new();
        for kind in self.agents() {
            let mut actions = Map::new();
            for schema in self.actions_for(kind) {
                let args: Vec<Value> = schema
                    .args
                    .iter()
                    .map(|arg| {
                        let mut entry = json!({
                            "name": arg.name,
                            "type": arg.kind.as_str(),
                            "required": arg.required,
                            "description": arg.description,
                        });
                        if !arg.choices.is_empty() {
                            entry["choices"] = json!(arg.choices);
                        }
                        entry
                    })
                    .collect();
                actions.insert(
                    schema.action.to_string(),
                    json!({ "description": schema.description, "args": args }),
                );
            }
            agents.insert(kind.as_str().to_string(), Value::Object(actions));
        }
        Value::Object(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ActionId, ArgKind, ArgSpec, SanitizePolicy};

    #[test]
    fn lookup_resolves_registered_actions() {
        let registry = CapabilityRegistry::builtin();
        let schema = registry
            .lookup("GithubAgent", "list_recent_commits")
            .expect("registered");
        assert_eq!(schema.id, ActionId::ListRecentCommits);
        assert!(schema.arg("limit").is_some_and(|arg| !arg.required));
    }

    #[test]
    fn lookup_distinguishes_unknown_agent_and_action() {
        let registry = CapabilityRegistry::builtin();
        assert_eq!(
            registry.lookup("ShellAgent", "exec"),
            Err(LookupError::UnknownAgent("ShellAgent".to_string()))
        );
        assert_eq!(
            registry.lookup("AWSAgent", "delete_bucket"),
            Err(LookupError::UnknownAction {
                agent: AgentKind::Aws,
                action: "delete_bucket".to_string(),
            })
        );
    }

    #[test]
    fn agent_missing_from_a_narrow_catalog_is_unknown() {
        static ONLY_JIRA: &[ActionSchema] = &[ActionSchema {
            agent: AgentKind::Jira,
            action: "get_issue",
            id: ActionId::GetIssue,
            description: "Read one Jira issue",
            args: &[ArgSpec::required(
                "issue_key",
                ArgKind::String,
                SanitizePolicy::IssueKey,
                "Issue key",
            )],
        }];
        let registry = CapabilityRegistry::from_catalog(ONLY_JIRA);
        assert!(matches!(
            registry.lookup("GithubAgent", "get_pr"),
            Err(LookupError::UnknownAgent(_))
        ));
        assert_eq!(registry.agents(), vec![AgentKind::Jira]);
    }

    #[test]
    fn describe_lists_arguments_and_choices() {
        let described = CapabilityRegistry::builtin().describe();
        let services = &described["JenkinsAgent"]["trigger_provide_access"]["args"][1];
        assert_eq!(services["name"], "services");
        assert_eq!(services["type"], "array of strings");
        assert_eq!(services["choices"][0], "AWS");
        assert!(described["AWSAgent"]["list_s3_buckets"]["args"]
            .as_array()
            .is_some_and(Vec::is_empty));
    }
}
