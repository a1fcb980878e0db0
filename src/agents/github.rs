use super::{capped_limit, required_str, Agent, AgentError, AgentOutput};
use crate::capability::{ActionId, AgentKind};
use crate::orchestration::plan::ValidatedArgs;
use crate::shared::http::{bearer_value, classify_error, encode_query, http_agent, join_url, HttpFailure};
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;

const MAX_PATCH_CHARS: usize = 4_000;
const MAX_FILE_CHARS: usize = 40_000;
const TRUNCATION_MARK: &str = "\n...TRUNCATED...";
const DEFAULT_COMMIT_LIMIT: u32 = 10;
const MAX_COMMIT_LIMIT: u32 = 50;
const MAX_ATTEMPTS: usize = 3;

/// Read-only GitHub REST access.
#[derive(Debug, Clone)]
pub struct GithubAgent {
    api_base: String,
    token_env: Option<String>,
    timeout: Duration,
}

impl GithubAgent {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into(),
            token_env: None,
            timeout,
        }
    }

    /// Names the environment variable holding a token. It is read per request.
    pub fn with_token_env(mut self, env: Option<String>) -> Self {
        self.token_env = env;
        self
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, AgentError> {
        let mut url = join_url(&self.api_base, path);
        if !query.is_empty() {
            url = format!("{url}?{}", encode_query(query));
        }
        let token = self
            .token_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|token| !token.trim().is_empty());
        let agent = http_agent(self.timeout);

        let mut last_failure = None;
        for _ in 0..MAX_ATTEMPTS {
            let mut request = agent
                .get(&url)
                .set("Accept", "application/vnd.github+json")
                .set("User-Agent", "agentops");
            if let Some(token) = &token {
                request = request.set("Authorization", &bearer_value(token));
            }
            match request.call() {
                Ok(response) => {
                    return response.into_json::<Value>().map_err(|err| AgentError::Parse {
                        agent: AgentKind::Github,
                        reason: err.to_string(),
                    })
                }
                Err(err) => {
                    let failure = classify_error(err);
                    if !is_retryable(&failure) {
                        return Err(AgentError::from_http(AgentKind::Github, failure));
                    }
                    last_failure = Some(failure);
                }
            }
        }
        Err(match last_failure {
            Some(failure) => AgentError::from_http(AgentKind::Github, failure),
            None => AgentError::Request {
                agent: AgentKind::Github,
                reason: "no attempt was made".to_string(),
            },
        })
    }

    fn get_pr(&self, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        let owner = required_str(AgentKind::Github, args, "owner")?;
        let repo = required_str(AgentKind::Github, args, "repo")?;
        let number = args
            .int("number")
            .ok_or_else(|| AgentError::missing(AgentKind::Github, "number"))?;
        if number <= 0 {
            return Err(AgentError::Request {
                agent: AgentKind::Github,
                reason: format!("pull request number must be positive, got {number}"),
            });
        }
        let pr = self.get(&format!("repos/{owner}/{repo}/pulls/{number}"), &[])?;
        let files = self.get(
            &format!("repos/{owner}/{repo}/pulls/{number}/files"),
            &[("per_page", "100")],
        )?;
        let (data, truncated) = pull_request_summary(&pr, &files);
        Ok(AgentOutput::new(data).truncated(truncated))
    }

    fn list_recent_commits(&self, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        let owner = required_str(AgentKind::Github, args, "owner")?;
        let repo = required_str(AgentKind::Github, args, "repo")?;
        let branch = required_str(AgentKind::Github, args, "branch")?;
        let (limit, narrowed) = capped_limit(args.int("limit"), DEFAULT_COMMIT_LIMIT, MAX_COMMIT_LIMIT);
        let per_page = limit.to_string();
        let commits = self.get(
            &format!("repos/{owner}/{repo}/commits"),
            &[("sha", branch), ("per_page", per_page.as_str())],
        )?;
        let mut output = AgentOutput::new(json!({ "commits": commit_summaries(&commits) }))
            .truncated(narrowed);
        if narrowed {
            output = output.with_warning(format!("commit limit capped at {MAX_COMMIT_LIMIT}"));
        }
        Ok(output)
    }

    fn get_file(&self, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        let owner = required_str(AgentKind::Github, args, "owner")?;
        let repo = required_str(AgentKind::Github, args, "repo")?;
        let path = required_str(AgentKind::Github, args, "path")?;
        let git_ref = required_str(AgentKind::Github, args, "ref")?;
        let response = self.get(
            &format!("repos/{owner}/{repo}/contents/{path}"),
            &[("ref", git_ref)],
        )?;
        let (data, truncated) = decode_file_content(&response)?;
        Ok(AgentOutput::new(data).truncated(truncated))
    }
}

impl Agent for GithubAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Github
    }

    fn invoke(&self, action: ActionId, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        match action {
            ActionId::GetPr => self.get_pr(args),
            ActionId::ListRecentCommits => self.list_recent_commits(args),
            ActionId::GetFile => self.get_file(args),
            other => Err(AgentError::UnsupportedAction {
                agent: AgentKind::Github,
                action: other,
            }),
        }
    }
}

fn is_retryable(failure: &HttpFailure) -> bool {
    match failure {
        HttpFailure::Transport(_) => true,
        HttpFailure::Status { status, .. } => *status == 429 || *status >= 500,
    }
}

fn clip_marked(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push_str(TRUNCATION_MARK);
    (clipped, true)
}

fn pull_request_summary(pr: &Value, files: &Value) -> (Value, bool) {
    let mut any_truncated = false;
    let mut changed = Vec::new();
    let mut summaries = Vec::new();
    for file in files.as_array().map(Vec::as_slice).unwrap_or_default() {
        let filename = file.get("filename").cloned().unwrap_or(Value::Null);
        if filename.is_string() {
            changed.push(filename.clone());
        }
        let (patch, truncated) = match file.get("patch").and_then(Value::as_str) {
            Some(patch) => {
                let (patch, truncated) = clip_marked(patch, MAX_PATCH_CHARS);
                (Value::String(patch), truncated)
            }
            None => (Value::Null, false),
        };
        any_truncated |= truncated;
        summaries.push(json!({
            "filename": filename,
            "status": file.get("status").cloned().unwrap_or(Value::Null),
            "additions": file.get("additions").cloned().unwrap_or(Value::Null),
            "deletions": file.get("deletions").cloned().unwrap_or(Value::Null),
            "changes": file.get("changes").cloned().unwrap_or(Value::Null),
            "patch": patch,
            "truncated": truncated,
        }));
    }
    let data = json!({
        "title": pr.get("title").cloned().unwrap_or(Value::Null),
        "author": pr.pointer("/user/login").cloned().unwrap_or(Value::Null),
        "state": pr.get("state").cloned().unwrap_or(Value::Null),
        "body": pr.get("body").cloned().unwrap_or(Value::Null),
        "changed_files": changed,
        "files": summaries,
    });
    (data, any_truncated)
}

fn commit_summaries(commits: &Value) -> Vec<Value> {
    commits
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|commit| {
            json!({
                "sha": commit.get("sha").cloned().unwrap_or(Value::Null),
                "message": commit.pointer("/commit/message").cloned().unwrap_or(Value::Null),
                "author": commit.pointer("/commit/author/name").cloned().unwrap_or(Value::Null),
                "date": commit.pointer("/commit/author/date").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

fn decode_file_content(response: &Value) -> Result<(Value, bool), AgentError> {
    let parse_error = |reason: &str| AgentError::Parse {
        agent: AgentKind::Github,
        reason: reason.to_string(),
    };
    if response.is_array() {
        return Err(parse_error("requested path is a directory"));
    }
    if response.get("encoding").and_then(Value::as_str) != Some("base64") {
        return Err(parse_error("unexpected file encoding"));
    }
    let content = response
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error("file content is missing"))?;
    // GitHub wraps base64 content at 60 columns.
    let compact: String = content.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|err| parse_error(&format!("invalid base64 content: {err}")))?;
    let text = String::from_utf8_lossy(&bytes);
    let (text, truncated) = clip_marked(&text, MAX_FILE_CHARS);
    Ok((
        json!({
            "path": response.get("path").cloned().unwrap_or(Value::Null),
            "sha": response.get("sha").cloned().unwrap_or(Value::Null),
            "size": response.get("size").cloned().unwrap_or(Value::Null),
            "content": text,
            "encoding": "utf-8",
        }),
        truncated,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_patches_are_clipped_and_flagged() {
        let pr = json!({"title": "Fix", "user": {"login": "octocat"}, "state": "open", "body": null});
        let files = json!([
            {"filename": "src/lib.rs", "status": "modified", "additions": 1, "deletions": 0, "changes": 1, "patch": "x".repeat(MAX_PATCH_CHARS + 5)},
            {"filename": "README.md", "status": "modified", "additions": 1, "deletions": 1, "changes": 2}
        ]);
        let (data, truncated) = pull_request_summary(&pr, &files);
        assert!(truncated);
        assert_eq!(data["author"], "octocat");
        assert_eq!(data["changed_files"], json!(["src/lib.rs", "README.md"]));
        assert_eq!(data["files"][0]["truncated"], true);
        assert!(data["files"][0]["patch"]
            .as_str()
            .expect("patch")
            .ends_with("...TRUNCATED..."));
        assert_eq!(data["files"][1]["patch"], Value::Null);
    }

    #[test]
    fn commits_keep_sha_message_author_and_date() {
        let commits = json!([{
            "sha": "abc123",
            "commit": {"message": "init", "author": {"name": "Jane", "date": "2024-01-01T00:00:00Z"}}
        }]);
        let parsed = commit_summaries(&commits);
        assert_eq!(
            parsed,
            vec![json!({"sha": "abc123", "message": "init", "author": "Jane", "date": "2024-01-01T00:00:00Z"})]
        );
    }

    #[test]
    fn file_content_is_decoded_from_wrapped_base64() {
        let response = json!({
            "path": "README.md",
            "sha": "f00",
            "size": 11,
            "encoding": "base64",
            "content": "aGVsbG8g\nd29ybGQ=\n"
        });
        let (data, truncated) = decode_file_content(&response).expect("decode");
        assert!(!truncated);
        assert_eq!(data["content"], "hello world");

        let err = decode_file_content(&json!([{"name": "src"}])).expect_err("directory");
        assert!(matches!(err, AgentError::Parse { .. }));
    }

    #[test]
    fn non_github_actions_are_unsupported() {
        let agent = GithubAgent::new("http://127.0.0.1:9", Duration::from_millis(100));
        let err = agent
            .invoke(ActionId::ListS3Buckets, &ValidatedArgs::default())
            .expect_err("unsupported");
        assert!(matches!(err, AgentError::UnsupportedAction { .. }));
    }

    #[test]
    fn retries_cover_transport_and_server_errors_only() {
        assert!(is_retryable(&HttpFailure::Transport("reset".to_string())));
        assert!(is_retryable(&HttpFailure::Status { status: 502, body: String::new() }));
        assert!(!is_retryable(&HttpFailure::Status { status: 404, body: String::new() }));
    }
}
