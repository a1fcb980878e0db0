pub mod catalog;
pub mod registry;

pub use catalog::{SUPPORTED_SERVICES, CATALOG};
pub use registry::{CapabilityRegistry, LookupError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "GithubAgent")]
    Github,
    #[serde(rename = "AWSAgent")]
    Aws,
    #[serde(rename = "JiraAgent")]
    Jira,
    #[serde(rename = "JenkinsAgent")]
    Jenkins,
    #[serde(rename = "EntraAgent")]
    Entra,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Github,
        AgentKind::Aws,
        AgentKind::Jira,
        AgentKind::Jenkins,
        AgentKind::Entra,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "GithubAgent",
            Self::Aws => "AWSAgent",
            Self::Jira => "JiraAgent",
            Self::Jenkins => "JenkinsAgent",
            Self::Entra => "EntraAgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of dispatchable actions. Agents match on this instead of the
/// planner-supplied action string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionId {
    GetPr,
    ListRecentCommits,
    GetFile,
    ListS3Buckets,
    DescribeEc2Instances,
    GetS3ObjectHead,
    GetIssue,
    SearchIssues,
    TriggerProvideAccess,
    GenerateCompanyEmail,
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GetPr => "get_pr",
            Self::ListRecentCommits => "list_recent_commits",
            Self::GetFile => "get_file",
            Self::ListS3Buckets => "list_s3_buckets",
            Self::DescribeEc2Instances => "describe_ec2_instances",
            Self::GetS3ObjectHead => "get_s3_object_head",
            Self::GetIssue => "get_issue",
            Self::SearchIssues => "search_issues",
            Self::TriggerProvideAccess => "trigger_provide_access",
            Self::GenerateCompanyEmail => "generate_company_email",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    String,
    Integer,
    Boolean,
    StringList,
}

impl ArgKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::StringList => "array of strings",
        }
    }
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Injection checks applied by the execution engine right before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizePolicy {
    None,
    RepoName,
    GitRef,
    RelativePath,
    Region,
    Bucket,
    ObjectKey,
    IssueKey,
    Jql,
    Email,
    PersonName,
    Slug,
    /// http(s) URL whose host must be in `execution.allowed_hosts`. No
    /// builtin action declares one yet.
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub sanitize: SanitizePolicy,
    /// Non-empty for closed value sets. Matching is case-insensitive and
    /// values are rewritten to the canonical spelling.
    pub choices: &'static [&'static str],
    pub description: &'static str,
}

impl ArgSpec {
    pub const fn required(
        name: &'static str,
        kind: ArgKind,
        sanitize: SanitizePolicy,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: true,
            sanitize,
            choices: &[],
            description,
        }
    }

    pub const fn optional(
        name: &'static str,
        kind: ArgKind,
        sanitize: SanitizePolicy,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            sanitize,
            choices: &[],
            description,
        }
    }

    pub const fn with_choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ActionSchema {
    pub agent: AgentKind,
    pub action: &'static str,
    pub id: ActionId,
    pub description: &'static str,
    pub args: &'static [ArgSpec],
}

impl ActionSchema {
    pub fn arg(&self, name: &str) -> Option<&'static ArgSpec> {
        let args: &'static [ArgSpec] = self.args;
        args.iter().find(|spec| spec.name == name)
    }

    pub fn required_args(&self) -> impl Iterator<Item = &'static ArgSpec> {
        let args: &'static [ArgSpec] = self.args;
        args.iter().filter(|spec| spec.required)
    }
}
