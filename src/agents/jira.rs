use super::{capped_limit, required_str, Agent, AgentError, AgentOutput};
use crate::capability::{ActionId, AgentKind};
use crate::orchestration::plan::ValidatedArgs;
use crate::shared::http::{basic_auth_value, classify_error, encode_query, http_agent, join_url};
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 50;
const MAX_COMMENTS: usize = 10;

/// Jira REST v2 client. Credentials come from environment variables read on
/// each request.
#[derive(Debug, Clone)]
pub struct JiraAgent {
    base_url: String,
    username_env: String,
    token_env: String,
    timeout: Duration,
}

impl JiraAgent {
    pub fn new(
        base_url: impl Into<String>,
        username_env: impl Into<String>,
        token_env: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username_env: username_env.into(),
            token_env: token_env.into(),
            timeout,
        }
    }

    fn credentials(&self) -> Result<(String, String), AgentError> {
        let read = |env: &str| {
            std::env::var(env)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AgentError::NotConfigured {
                    agent: AgentKind::Jira,
                    reason: format!("environment variable {env} is not set"),
                })
        };
        Ok((read(&self.username_env)?, read(&self.token_env)?))
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, AgentError> {
        if self.base_url.trim().is_empty() {
            return Err(AgentError::NotConfigured {
                agent: AgentKind::Jira,
                reason: "jira.base_url is empty".to_string(),
            });
        }
        let (username, token) = self.credentials()?;
        let url = format!("{}?{}", join_url(&self.base_url, path), encode_query(query));
        let response = http_agent(self.timeout)
            .get(&url)
            .set("Accept", "application/json")
            .set("Authorization", &basic_auth_value(&username, &token))
            .call()
            .map_err(|err| AgentError::from_http(AgentKind::Jira, classify_error(err)))?;
        response.into_json::<Value>().map_err(|err| AgentError::Parse {
            agent: AgentKind::Jira,
            reason: err.to_string(),
        })
    }
}

impl Agent for JiraAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Jira
    }

    fn invoke(&self, action: ActionId, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        match action {
            ActionId::GetIssue => {
                let key = required_str(AgentKind::Jira, args, "issue_key")?;
                let issue = self.get(
                    &format!("rest/api/2/issue/{key}"),
                    &[("fields", "summary,description,reporter,status,comment")],
                )?;
                let (data, truncated) = issue_summary(&issue);
                Ok(AgentOutput::new(data).truncated(truncated))
            }
            ActionId::SearchIssues => {
                let jql = required_str(AgentKind::Jira, args, "jql")?;
                let (limit, narrowed) =
                    capped_limit(args.int("limit"), DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
                let max_results = limit.to_string();
                let found = self.get(
                    "rest/api/2/search",
                    &[
                        ("jql", jql),
                        ("maxResults", max_results.as_str()),
                        ("fields", "summary,status"),
                    ],
                )?;
                let mut output =
                    AgentOutput::new(json!({ "issues": search_results(&found) })).truncated(narrowed);
                if narrowed {
                    output = output.with_warning(format!("search limit capped at {MAX_SEARCH_LIMIT}"));
                }
                Ok(output)
            }
            other => Err(AgentError::UnsupportedAction {
                agent: AgentKind::Jira,
                action: other,
            }),
        }
    }
}

fn issue_summary(issue: &Value) -> (Value, bool) {
    let comments = issue
        .pointer("/fields/comment/comments")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let kept: Vec<Value> = comments
        .iter()
        .take(MAX_COMMENTS)
        .map(|comment| {
            json!({
                "author": comment.pointer("/author/displayName").cloned().unwrap_or(Value::Null),
                "body": comment.get("body").cloned().unwrap_or(Value::Null),
                "created": comment.get("created").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    let data = json!({
        "key": issue.get("key").cloned().unwrap_or(Value::Null),
        "summary": issue.pointer("/fields/summary").cloned().unwrap_or(Value::Null),
        "description": issue.pointer("/fields/description").cloned().unwrap_or(Value::Null),
        "reporter": issue.pointer("/fields/reporter/displayName").cloned().unwrap_or(Value::Null),
        "status": issue.pointer("/fields/status/name").cloned().unwrap_or(Value::Null),
        "comments": kept,
    });
    (data, comments.len() > MAX_COMMENTS)
}

fn search_results(found: &Value) -> Vec<Value> {
    found
        .get("issues")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|issue| {
            json!({
                "key": issue.get("key").cloned().unwrap_or(Value::Null),
                "summary": issue.pointer("/fields/summary").cloned().unwrap_or(Value::Null),
                "status": issue.pointer("/fields/status/name").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}
