use crate::capability::SanitizePolicy;
use crate::orchestration::plan::{ArgValue, ValidatedStep};
use std::collections::BTreeSet;
use std::net::IpAddr;

const JQL_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("argument `{arg}` rejected: {reason}")]
pub struct SanitizeError {
    pub arg: String,
    pub reason: String,
}

/// Injection checks for validated arguments, keyed by each argument's policy.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSanitizer {
    allowed_hosts: BTreeSet<String>,
}

impl ArgumentSanitizer {
    pub fn new<I, S>(allowed_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|host| host.as_ref().trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn check_step(&self, step: &ValidatedStep) -> Result<(), SanitizeError> {
        for (name, value) in step.args().iter() {
            let Some(spec) = step.schema().arg(name) else {
                continue;
            };
            let values: Vec<&str> = match value {
                ArgValue::String(value) => vec![value.as_str()],
                ArgValue::StringList(values) => values.iter().map(String::as_str).collect(),
                ArgValue::Integer(_) | ArgValue::Boolean(_) => continue,
            };
            for raw in values {
                self.check_value(spec.sanitize, raw)
                    .map_err(|reason| SanitizeError {
                        arg: name.to_string(),
                        reason,
                    })?;
            }
        }
        Ok(())
    }

    pub fn check_value(&self, policy: SanitizePolicy, value: &str) -> Result<(), String> {
        match policy {
            SanitizePolicy::None => Ok(()),
            SanitizePolicy::RepoName => check_repo_name(value),
            SanitizePolicy::GitRef => check_git_ref(value),
            SanitizePolicy::RelativePath | SanitizePolicy::ObjectKey => check_relative_path(value),
            SanitizePolicy::Region => check_region(value),
            SanitizePolicy::Bucket => check_bucket(value),
            SanitizePolicy::IssueKey => check_issue_key(value),
            SanitizePolicy::Jql => check_jql(value),
            SanitizePolicy::Email => check_email(value),
            SanitizePolicy::PersonName => check_person_name(value),
            SanitizePolicy::Slug => check_slug(value),
            SanitizePolicy::Url => self.check_url(value),
        }
    }

    fn check_url(&self, value: &str) -> Result<(), String> {
        let parsed = parse_http_url(value)?;
        if let Some(ip) = parsed.ip {
            if is_internal_ip(ip) {
                return Err(format!("host `{}` is a private or loopback address", parsed.host));
            }
        }
        if !self.allowed_hosts.contains(&parsed.host) {
            return Err(format!("host `{}` is not in the allowed host list", parsed.host));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrl {
    pub scheme: String,
    pub host: String,
    pub ip: Option<IpAddr>,
}

/// Minimal http(s) URL check: scheme, no embedded credentials, non-empty host.
pub fn parse_http_url(value: &str) -> Result<HttpUrl, String> {
    let trimmed = value.trim();
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| format!("`{trimmed}` is not an absolute URL"))?;
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(format!("scheme `{scheme}` is not allowed; use http or https"));
    }
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    if authority.contains('@') {
        return Err("URLs with embedded credentials are not allowed".to_string());
    }
    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed
            .split_once(']')
            .map(|(host, _)| host)
            .ok_or_else(|| "unterminated IPv6 host".to_string())?
    } else {
        authority.split(':').next().unwrap_or_default()
    };
    if host.is_empty() {
        return Err("URL has no host".to_string());
    }
    let host = host.to_ascii_lowercase();
    Ok(HttpUrl {
        ip: host.parse::<IpAddr>().ok(),
        scheme,
        host,
    })
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            let unique_local = (v6.segments()[0] & 0xfe00) == 0xfc00;
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            v6.is_loopback() || v6.is_unspecified() || unique_local || link_local
        }
    }
}

fn check_repo_name(value: &str) -> Result<(), String> {
    if value.is_empty() || value == "." || value == ".." {
        return Err("name must be non-empty and not a relative path marker".to_string());
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
    {
        return Ok(());
    }
    Err(format!("`{value}` may only contain letters, digits, '_', '.' or '-'"))
}

fn check_git_ref(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("ref must be non-empty".to_string());
    }
    if value.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err("ref must not contain whitespace".to_string());
    }
    if value.contains("..") || value.starts_with('-') {
        return Err(format!("`{value}` is not a safe ref"));
    }
    Ok(())
}

fn check_relative_path(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("path must be non-empty".to_string());
    }
    if value.starts_with('/') || value.starts_with('\\') {
        return Err("path must be relative".to_string());
    }
    if value.chars().any(char::is_control) {
        return Err("path must not contain control characters".to_string());
    }
    if value.split(['/', '\\']).any(|segment| segment == "..") {
        return Err("path must not traverse upwards".to_string());
    }
    Ok(())
}

fn check_region(value: &str) -> Result<(), String> {
    let parts: Vec<&str> = value.split('-').collect();
    let valid = parts.len() >= 3
        && parts[0].len() == 2
        && parts[0].chars().all(|ch| ch.is_ascii_lowercase())
        && parts[1..parts.len() - 1]
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_lowercase()))
        && parts[parts.len() - 1]
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_digit())
        && parts[parts.len() - 1].chars().all(|ch| ch.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(format!("`{value}` is not an AWS region"))
    }
}

fn check_bucket(value: &str) -> Result<(), String> {
    let length_ok = (3..=63).contains(&value.len());
    let chars_ok = value
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '.' || ch == '-');
    if length_ok && chars_ok && !value.contains("..") {
        Ok(())
    } else {
        Err(format!("`{value}` is not a valid bucket name"))
    }
}

fn check_issue_key(value: &str) -> Result<(), String> {
    let valid = value.split_once('-').is_some_and(|(project, number)| {
        let mut chars = project.chars();
        chars.next().is_some_and(|ch| ch.is_ascii_uppercase())
            && project.len() >= 2
            && chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
            && !number.is_empty()
            && number.chars().all(|ch| ch.is_ascii_digit())
    });
    if valid {
        Ok(())
    } else {
        Err(format!("`{value}` is not an issue key"))
    }
}

fn check_jql(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("query must be non-empty".to_string());
    }
    if value.chars().count() > JQL_MAX_CHARS {
        return Err(format!("query exceeds {JQL_MAX_CHARS} characters"));
    }
    if value.contains(';') || value.contains("--") {
        return Err("query must not contain `;` or `--`".to_string());
    }
    Ok(())
}

fn check_email(value: &str) -> Result<(), String> {
    let valid = value.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !value.chars().any(|ch| ch.is_whitespace() || ch.is_control())
    });
    if valid {
        Ok(())
    } else {
        Err(format!("`{value}` is not an email address"))
    }
}

fn check_person_name(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("name must be non-empty".to_string());
    }
    if value
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '\'' | '.'))
    {
        return Ok(());
    }
    Err(format!("`{value}` contains characters not allowed in a name"))
}

fn check_slug(value: &str) -> Result<(), String> {
    if !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
    {
        return Ok(());
    }
    Err(format!("`{value}` may only contain letters, digits, '_', '-' or '.'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> ArgumentSanitizer {
        ArgumentSanitizer::new(["api.github.com", "jira.example.com"])
    }

    #[test]
    fn url_policy_enforces_scheme_host_list_and_private_ranges() {
        let sanitizer = sanitizer();
        assert!(sanitizer
            .check_value(SanitizePolicy::Url, "https://api.github.com/repos/acme/widgets")
            .is_ok());
        assert!(sanitizer
            .check_value(SanitizePolicy::Url, "https://evil.example.net/")
            .is_err());
        assert!(sanitizer
            .check_value(SanitizePolicy::Url, "file:///etc/passwd")
            .is_err());
        assert!(sanitizer
            .check_value(SanitizePolicy::Url, "http://169.254.169.254/latest/meta-data")
            .is_err());
        assert!(sanitizer
            .check_value(SanitizePolicy::Url, "http://[::1]:8080/")
            .is_err());
        assert!(sanitizer
            .check_value(SanitizePolicy::Url, "https://user:pw@api.github.com/")
            .is_err());
    }

    #[test]
    fn path_policies_reject_traversal_and_absolute_paths() {
        let sanitizer = sanitizer();
        assert!(sanitizer
            .check_value(SanitizePolicy::RelativePath, "src/lib.rs")
            .is_ok());
        assert!(sanitizer
            .check_value(SanitizePolicy::RelativePath, "../secrets.env")
            .is_err());
        assert!(sanitizer
            .check_value(SanitizePolicy::RelativePath, "docs/../../x")
            .is_err());
        assert!(sanitizer
            .check_value(SanitizePolicy::ObjectKey, "/etc/passwd")
            .is_err());
    }

    #[test]
    fn identifier_policies_follow_their_shapes() {
        let s = sanitizer();
        assert!(s.check_value(SanitizePolicy::RepoName, "widgets.rs-2").is_ok());
        assert!(s.check_value(SanitizePolicy::RepoName, "acme/widgets").is_err());
        assert!(s.check_value(SanitizePolicy::GitRef, "release/1.2").is_ok());
        assert!(s.check_value(SanitizePolicy::GitRef, "main; rm").is_err());
        assert!(s.check_value(SanitizePolicy::Region, "us-east-1").is_ok());
        assert!(s.check_value(SanitizePolicy::Region, "us-gov-west-1").is_ok());
        assert!(s.check_value(SanitizePolicy::Region, "useast1").is_err());
        assert!(s.check_value(SanitizePolicy::Bucket, "team-logs.prod").is_ok());
        assert!(s.check_value(SanitizePolicy::Bucket, "Team_Logs").is_err());
        assert!(s.check_value(SanitizePolicy::IssueKey, "OPS-123").is_ok());
        assert!(s.check_value(SanitizePolicy::IssueKey, "ops-123").is_err());
        assert!(s.check_value(SanitizePolicy::Jql, "project = OPS").is_ok());
        assert!(s.check_value(SanitizePolicy::Jql, "project = OPS; drop").is_err());
        assert!(s.check_value(SanitizePolicy::Jql, &"a".repeat(501)).is_err());
        assert!(s.check_value(SanitizePolicy::Email, "jane.doe@example.com").is_ok());
        assert!(s.check_value(SanitizePolicy::Email, "jane@@example.com").is_err());
        assert!(s.check_value(SanitizePolicy::PersonName, "Anne-Marie O'Neil").is_ok());
        assert!(s.check_value(SanitizePolicy::PersonName, "x<script>").is_err());
        assert!(s.check_value(SanitizePolicy::Slug, "platform-team").is_ok());
        assert!(s.check_value(SanitizePolicy::Slug, "a b").is_err());
    }

    #[test]
    fn parse_http_url_extracts_lowercase_host() {
        let parsed = parse_http_url("HTTPS://Jenkins.Example.com:8443/job/x").expect("parse");
        assert_eq!(parsed.scheme, "https");
        assert_eq!(parsed.host, "jenkins.example.com");
        assert!(parsed.ip.is_none());
    }
}
