use super::{ActionId, ActionSchema, AgentKind, ArgKind, ArgSpec, SanitizePolicy};

/// Services the provisioning pipeline knows how to grant, in canonical spelling.
pub const SUPPORTED_SERVICES: &[&str] = &["AWS", "Confluence", "Database", "GitHub"];

const OWNER: ArgSpec = ArgSpec::required(
    "owner",
    ArgKind::String,
    SanitizePolicy::RepoName,
    "Repository owner or organization",
);
const REPO: ArgSpec = ArgSpec::required(
    "repo",
    ArgKind::String,
    SanitizePolicy::RepoName,
    "Repository name",
);

const GET_PR_ARGS: &[ArgSpec] = &[
    OWNER,
    REPO,
    ArgSpec::required(
        "number",
        ArgKind::Integer,
        SanitizePolicy::None,
        "Pull request number",
    ),
];

const LIST_RECENT_COMMITS_ARGS: &[ArgSpec] = &[
    OWNER,
    REPO,
    ArgSpec::required(
        "branch",
        ArgKind::String,
        SanitizePolicy::GitRef,
        "Branch to read history from",
    ),
    ArgSpec::optional(
        "limit",
        ArgKind::Integer,
        SanitizePolicy::None,
        "Number of commits to return (default 10, max 50)",
    ),
];

const GET_FILE_ARGS: &[ArgSpec] = &[
    OWNER,
    REPO,
    ArgSpec::required(
        "path",
        ArgKind::String,
        SanitizePolicy::RelativePath,
        "Repository-relative file path",
    ),
    ArgSpec::required(
        "ref",
        ArgKind::String,
        SanitizePolicy::GitRef,
        "Branch, tag or commit sha",
    ),
];

const DESCRIBE_EC2_ARGS: &[ArgSpec] = &[ArgSpec::required(
    "region",
    ArgKind::String,
    SanitizePolicy::Region,
    "AWS region, for example us-east-1",
)];

const S3_OBJECT_HEAD_ARGS: &[ArgSpec] = &[
    ArgSpec::required(
        "bucket",
        ArgKind::String,
        SanitizePolicy::Bucket,
        "Bucket name",
    ),
    ArgSpec::required(
        "key",
        ArgKind::String,
        SanitizePolicy::ObjectKey,
        "Object key",
    ),
];

const GET_ISSUE_ARGS: &[ArgSpec] = &[ArgSpec::required(
    "issue_key",
    ArgKind::String,
    SanitizePolicy::IssueKey,
    "Issue key such as OPS-123",
)];

const SEARCH_ISSUES_ARGS: &[ArgSpec] = &[
    ArgSpec::required("jql", ArgKind::String, SanitizePolicy::Jql, "JQL query"),
    ArgSpec::optional(
        "limit",
        ArgKind::Integer,
        SanitizePolicy::None,
        "Maximum issues to return (default 20, max 50)",
    ),
];

const PROVIDE_ACCESS_ARGS: &[ArgSpec] = &[
    ArgSpec::required(
        "user_email",
        ArgKind::String,
        SanitizePolicy::Email,
        "Company email of the user receiving access",
    ),
    ArgSpec::required(
        "services",
        ArgKind::StringList,
        SanitizePolicy::None,
        "Services to grant",
    )
    .with_choices(SUPPORTED_SERVICES),
    ArgSpec::optional(
        "cc_email",
        ArgKind::String,
        SanitizePolicy::Email,
        "Address copied on the pipeline notification",
    ),
    ArgSpec::optional(
        "aws_iam_user_group",
        ArgKind::String,
        SanitizePolicy::Slug,
        "IAM group for AWS access",
    ),
    ArgSpec::optional(
        "github_team",
        ArgKind::String,
        SanitizePolicy::Slug,
        "GitHub team for repository access",
    ),
    ArgSpec::optional(
        "env_name",
        ArgKind::String,
        SanitizePolicy::Slug,
        "Target environment name",
    ),
];

const COMPANY_EMAIL_ARGS: &[ArgSpec] = &[
    ArgSpec::required(
        "firstname",
        ArgKind::String,
        SanitizePolicy::PersonName,
        "Given name",
    ),
    ArgSpec::required(
        "lastname",
        ArgKind::String,
        SanitizePolicy::PersonName,
        "Family name",
    ),
    ArgSpec::optional(
        "full_name",
        ArgKind::String,
        SanitizePolicy::PersonName,
        "Display name, defaults to firstname lastname",
    ),
];

pub const CATALOG: &[ActionSchema] = &[
    ActionSchema {
        agent: AgentKind::Github,
        action: "get_pr",
        id: ActionId::GetPr,
        description: "Read pull request details",
        args: GET_PR_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Github,
        action: "list_recent_commits",
        id: ActionId::ListRecentCommits,
        description: "List recent commits on a branch",
        args: LIST_RECENT_COMMITS_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Github,
        action: "get_file",
        id: ActionId::GetFile,
        description: "Read one file at a ref",
        args: GET_FILE_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Aws,
        action: "list_s3_buckets",
        id: ActionId::ListS3Buckets,
        description: "List S3 buckets in the account",
        args: &[],
    },
    ActionSchema {
        agent: AgentKind::Aws,
        action: "describe_ec2_instances",
        id: ActionId::DescribeEc2Instances,
        description: "Describe EC2 instances in a region",
        args: DESCRIBE_EC2_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Aws,
        action: "get_s3_object_head",
        id: ActionId::GetS3ObjectHead,
        description: "Read S3 object metadata",
        args: S3_OBJECT_HEAD_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Jira,
        action: "get_issue",
        id: ActionId::GetIssue,
        description: "Read one Jira issue",
        args: GET_ISSUE_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Jira,
        action: "search_issues",
        id: ActionId::SearchIssues,
        description: "Search Jira issues with JQL",
        args: SEARCH_ISSUES_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Jenkins,
        action: "trigger_provide_access",
        id: ActionId::TriggerProvideAccess,
        description: "Trigger the access provisioning pipeline",
        args: PROVIDE_ACCESS_ARGS,
    },
    ActionSchema {
        agent: AgentKind::Entra,
        action: "generate_company_email",
        id: ActionId::GenerateCompanyEmail,
        description: "Create a directory user and return the company email",
        args: COMPANY_EMAIL_ARGS,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_action_names_are_unique_per_agent() {
        let mut seen = HashSet::new();
        for schema in CATALOG {
            assert!(
                seen.insert((schema.agent, schema.action)),
                "duplicate {} {}",
                schema.agent,
                schema.action
            );
            assert_eq!(schema.id.to_string(), schema.action);
        }
    }

    #[test]
    fn every_agent_kind_has_at_least_one_action() {
        for kind in AgentKind::ALL {
            assert!(CATALOG.iter().any(|schema| schema.agent == kind), "{kind}");
        }
    }

    #[test]
    fn argument_names_are_unique_within_an_action() {
        for schema in CATALOG {
            let names: HashSet<_> = schema.args.iter().map(|arg| arg.name).collect();
            assert_eq!(names.len(), schema.args.len(), "{}", schema.action);
        }
    }
}
