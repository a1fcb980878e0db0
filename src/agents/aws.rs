use super::{required_str, Agent, AgentError, AgentOutput};
use crate::capability::{ActionId, AgentKind};
use crate::orchestration::plan::ValidatedArgs;
use crate::shared::command::{run_command, CommandError, CommandSpec};
use serde_json::{json, Value};
use std::time::Duration;

const MAX_LISTED: usize = 50;

/// Read-only AWS queries through the `aws` CLI, which owns credential
/// resolution.
#[derive(Debug, Clone)]
pub struct AwsAgent {
    cli_binary: String,
    default_region: String,
    profile: Option<String>,
    timeout: Duration,
}

impl AwsAgent {
    pub fn new(
        cli_binary: impl Into<String>,
        default_region: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            cli_binary: cli_binary.into(),
            default_region: default_region.into(),
            profile: None,
            timeout,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    fn run(&self, region: &str, args: &[&str]) -> Result<Value, AgentError> {
        let mut spec = CommandSpec::new(&self.cli_binary, self.timeout)
            .args(args.iter().copied())
            .args(["--region", region, "--output", "json"]);
        if let Some(profile) = &self.profile {
            spec = spec.args(["--profile", profile.as_str()]);
        }
        let stdout = run_command(&spec).map_err(|err| match err {
            CommandError::MissingBinary { binary } => AgentError::NotConfigured {
                agent: AgentKind::Aws,
                reason: format!("`{binary}` is not installed"),
            },
            other => AgentError::Request {
                agent: AgentKind::Aws,
                reason: other.to_string(),
            },
        })?;
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|err| AgentError::Parse {
            agent: AgentKind::Aws,
            reason: err.to_string(),
        })
    }
}

impl Agent for AwsAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Aws
    }

    fn invoke(&self, action: ActionId, args: &ValidatedArgs) -> Result<AgentOutput, AgentError> {
        match action {
            ActionId::ListS3Buckets => {
                let raw = self.run(&self.default_region, &["s3api", "list-buckets"])?;
                let (buckets, truncated) = bucket_names(&raw);
                Ok(AgentOutput::new(json!({ "buckets": buckets })).truncated(truncated))
            }
            ActionId::DescribeEc2Instances => {
                let region = required_str(AgentKind::Aws, args, "region")?;
                let max_items = MAX_LISTED.to_string();
                let raw = self.run(
                    region,
                    &["ec2", "describe-instances", "--max-items", max_items.as_str()],
                )?;
                let (instances, truncated) = instance_summaries(&raw);
                Ok(AgentOutput::new(json!({ "region": region, "instances": instances }))
                    .truncated(truncated))
            }
            ActionId::GetS3ObjectHead => {
                let bucket = required_str(AgentKind::Aws, args, "bucket")?;
                let key = required_str(AgentKind::Aws, args, "key")?;
                let raw = self.run(
                    &self.default_region,
                    &["s3api", "head-object", "--bucket", bucket, "--key", key],
                )?;
                Ok(AgentOutput::new(object_head(bucket, key, &raw)))
            }
            other => Err(AgentError::UnsupportedAction {
                agent: AgentKind::Aws,
                action: other,
            }),
        }
    }
}

fn bucket_names(raw: &Value) -> (Vec<Value>, bool) {
    let buckets = raw
        .get("Buckets")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let names = buckets
        .iter()
        .filter_map(|bucket| bucket.get("Name").cloned())
        .take(MAX_LISTED)
        .collect();
    (names, buckets.len() > MAX_LISTED)
}

fn instance_summaries(raw: &Value) -> (Vec<Value>, bool) {
    let mut details = Vec::new();
    let reservations = raw
        .get("Reservations")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for instance in reservations.iter().flat_map(|reservation| {
        reservation
            .get("Instances")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }) {
        if details.len() == MAX_LISTED {
            return (details, true);
        }
        details.push(json!({
            "instance_id": instance.get("InstanceId").cloned().unwrap_or(Value::Null),
            "type": instance.get("InstanceType").cloned().unwrap_or(Value::Null),
            "state": instance.pointer("/State/Name").cloned().unwrap_or(Value::Null),
            "launch_time": instance.get("LaunchTime").cloned().unwrap_or(Value::Null),
        }));
    }
    // The CLI reports further pages through NextToken.
    let more = raw.get("NextToken").is_some_and(|token| !token.is_null());
    (details, more)
}

fn object_head(bucket: &str, key: &str, raw: &Value) -> Value {
    json!({
        "bucket": bucket,
        "key": key,
        "size": raw.get("ContentLength").cloned().unwrap_or(Value::Null),
        "content_type": raw.get("ContentType").cloned().unwrap_or(Value::Null),
        "etag": raw.get("ETag").cloned().unwrap_or(Value::Null),
        "last_modified": raw.get("LastModified").cloned().unwrap_or(Value::Null),
        "metadata": raw.get("Metadata").cloned().unwrap_or_else(|| json!({})),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_listing_is_capped() {
        let buckets: Vec<Value> = (0..60).map(|i| json!({"Name": format!("bucket-{i}")})).collect();
        let (names, truncated) = bucket_names(&json!({ "Buckets": buckets }));
        assert!(truncated);
        assert_eq!(names.len(), MAX_LISTED);
        assert_eq!(names[0], "bucket-0");
    }

    #[test]
    fn instances_flatten_reservations() {
        let raw = json!({
            "Reservations": [
                {"Instances": [{"InstanceId": "i-1", "InstanceType": "t3.micro", "State": {"Name": "running"}, "LaunchTime": "2024-01-01T00:00:00Z"}]},
                {"Instances": [{"InstanceId": "i-2", "InstanceType": "m5.large", "State": {"Name": "stopped"}}]}
            ]
        });
        let (instances, truncated) = instance_summaries(&raw);
        assert!(!truncated);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1]["state"], "stopped");
        assert_eq!(instances[1]["launch_time"], Value::Null);
    }

    #[test]
    fn missing_cli_is_not_configured() {
        let agent = AwsAgent::new(
            "agentops-test-missing-aws-cli",
            "us-east-2",
            Duration::from_secs(2),
        );
        let err = agent
            .invoke(ActionId::ListS3Buckets, &ValidatedArgs::default())
            .expect_err("missing binary");
        assert!(matches!(err, AgentError::NotConfigured { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn cli_output_is_parsed_from_stdout() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("aws");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"Buckets\":[{\"Name\":\"logs\"},{\"Name\":\"assets\"}]}'\n",
        )
        .expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let agent = AwsAgent::new(script.display().to_string(), "us-east-2", Duration::from_secs(5));
        let output = agent
            .invoke(ActionId::ListS3Buckets, &ValidatedArgs::default())
            .expect("list");
        assert_eq!(output.data, json!({"buckets": ["logs", "assets"]}));
        assert!(!output.truncated);
    }
}
