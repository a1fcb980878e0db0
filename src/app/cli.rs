use crate::capability::CATALOG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Task,
    Trace,
    User,
    Poc,
    Agents,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "task" => CliVerb::Task,
        "trace" => CliVerb::Trace,
        "user" => CliVerb::User,
        "poc" => CliVerb::Poc,
        "agents" => CliVerb::Agents,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Usage: agentops [--config <path>] <command>".to_string(),
        String::new(),
        "Commands:".to_string(),
        "  task run <task> [--context key=value ...]  Plan and execute a task".to_string(),
        "  trace show <request_id>                    Print a persisted run trace".to_string(),
        "  trace list                                 List persisted request ids".to_string(),
        "  user onboard --name N --email E --team T   Onboard a user (blocking)".to_string(),
        "  user list                                  List onboarding users".to_string(),
        "  user show --email E                        Show one user".to_string(),
        "  user advance --email E                     Run the next onboarding transition"
            .to_string(),
        "  user update --email E --item I --status S  Update an access item".to_string(),
        "  poc add --role R --team T --item I --poc P Add a POC routing rule".to_string(),
        "  poc list                                   List POC routing rules".to_string(),
        "  agents                                     Print the capability catalog".to_string(),
    ]
}

pub fn action_help_lines() -> Vec<String> {
    CATALOG
        .iter()
        .map(|schema| {
            format!(
                "  {0:36} {1}",
                format!("{}.{}", schema.agent, schema.action),
                schema.description
            )
        })
        .collect()
}

pub(crate) fn help_text() -> String {
    let mut lines = cli_help_lines();
    lines.push(String::new());
    lines.push("Agent actions:".to_string());
    lines.extend(action_help_lines());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_parse() {
        assert_eq!(parse_cli_verb("task"), CliVerb::Task);
        assert_eq!(parse_cli_verb("--help"), CliVerb::Help);
        assert_eq!(parse_cli_verb("deploy"), CliVerb::Unknown);
    }

    #[test]
    fn help_lists_every_action() {
        let help = help_text();
        for schema in CATALOG {
            assert!(help.contains(schema.action), "{}", schema.action);
        }
    }
}
