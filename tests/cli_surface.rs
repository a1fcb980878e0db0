use agentops::app::command_handlers::run_cli;
use agentops::onboarding::{NewUser, UserStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_config(root: &Path) -> PathBuf {
    let path = root.join("config.yaml");
    fs::write(
        &path,
        format!(
            r#"
state_root: {}
secrets:
  backend: file
pipeline:
  base_url: http://127.0.0.1:9
onboarding:
  issuance_delay_seconds: 0
  provisioning_delay_seconds: 0
"#,
            root.join("state").display()
        ),
    )
    .expect("write config");
    path
}

fn cli(config: &Path, args: &[&str]) -> Result<String, String> {
    let mut full = vec!["--config".to_string(), config.display().to_string()];
    full.extend(args.iter().map(|arg| arg.to_string()));
    run_cli(full)
}

#[test]
fn no_arguments_prints_help() {
    let help = run_cli(Vec::new()).expect("help");
    assert!(help.contains("task run"));
    assert!(help.contains("GithubAgent.list_recent_commits"));
}

#[test]
fn unknown_command_is_an_error() {
    let err = run_cli(vec!["deploy".to_string()]).expect_err("unknown");
    assert!(err.contains("unknown command `deploy`"));
}

#[test]
fn agents_lists_the_catalog_without_config() {
    let out = run_cli(vec!["agents".to_string()]).expect("agents");
    assert!(out.contains("JenkinsAgent"));
    assert!(out.contains("  trigger_provide_access user_email services"));
    assert!(out.contains("[limit]"));

    let json = run_cli(vec!["agents".to_string(), "--json".to_string()]).expect("json");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert!(value.is_object());
}

#[test]
fn invalid_config_is_reported() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("config.yaml");
    fs::write(&path, "state_root: relative/path\n").expect("write");
    let err = cli(&path, &["user", "list"]).expect_err("invalid");
    assert!(err.contains("state_root"));
}

#[test]
fn poc_routes_are_added_once_and_listed() {
    let temp = tempdir().expect("tempdir");
    let config = write_config(temp.path());

    let added = cli(
        &config,
        &["poc", "add", "--role", "engineer", "--team", "backend", "--item", "AWS", "--poc", "poc-cloud"],
    )
    .expect("add");
    assert!(added.starts_with("route added"));
    let again = cli(
        &config,
        &["poc", "add", "--role", "engineer", "--team", "backend", "--item", "AWS", "--poc", "poc-cloud"],
    )
    .expect("add again");
    assert!(again.starts_with("route already present"));

    let listed = cli(&config, &["poc", "list"]).expect("list");
    assert_eq!(listed, "team=backend role=engineer item=AWS poc=poc-cloud");

    let err = cli(&config, &["poc", "add", "--role", "engineer"]).expect_err("missing");
    assert!(err.contains("--team"));
}

#[test]
fn user_update_and_list_work_against_the_store() {
    let temp = tempdir().expect("tempdir");
    let config = write_config(temp.path());
    cli(
        &config,
        &["poc", "add", "--role", "engineer", "--team", "backend", "--item", "Slack", "--poc", "poc-it"],
    )
    .expect("route");

    let store = UserStore::open(&temp.path().join("state/db/users.sqlite")).expect("open");
    store
        .create_user(&NewUser::new("Grace Hopper", "grace@example.org", "backend"))
        .expect("create");

    let listed = cli(&config, &["user", "list"]).expect("list");
    assert!(listed.contains("name=Grace Hopper"));
    assert!(listed.contains("stage=new pending_items=1"));

    let updated = cli(
        &config,
        &["user", "update", "--email", "grace@example.org", "--item", "slack", "--status", "completed"],
    )
    .expect("update");
    assert!(updated.contains("changed=Slack"));
    assert!(updated.contains("stage=new"));

    let err = cli(
        &config,
        &["user", "update", "--email", "grace@example.org", "--item", "Slack", "--status", "done"],
    )
    .expect_err("bad status");
    assert!(err.contains("invalid status"));

    let shown = cli(&config, &["user", "show", "--email", "grace@example.org"]).expect("show");
    let value: serde_json::Value = serde_json::from_str(&shown).expect("json");
    assert_eq!(value["access_items"][0]["status"], "completed");
}

#[test]
fn unknown_trace_is_reported() {
    let temp = tempdir().expect("tempdir");
    let config = write_config(temp.path());
    let err = cli(&config, &["trace", "show", "req-missing"]).expect_err("missing");
    assert!(err.contains("no trace"));
    assert_eq!(cli(&config, &["trace", "list"]).expect("list"), "");
    assert!(cli(&config, &["trace", "show", "../etc"]).is_err());
}
