use crate::app::command_support::{parse_key_value, to_pretty_json, CliContext, FlagArgs};
use crate::orchestration::TaskRequest;

const USAGE: &str = "task run <task> [--context key=value ...]";

pub fn cmd_task(context: &CliContext, args: &[String]) -> Result<String, String> {
    match args.first().map(String::as_str) {
        Some("run") => {
            let request = parse_task_request(&args[1..])?;
            let runtime = context.runtime()?;
            let response = runtime.orchestrator().execute(&request);
            to_pretty_json(&response)
        }
        _ => Err(format!("usage: {USAGE}")),
    }
}

pub fn parse_task_request(args: &[String]) -> Result<TaskRequest, String> {
    let parsed = FlagArgs::parse(args)?;
    parsed.reject_unknown(&["context"])?;
    let task = parsed.positional.join(" ");
    if task.trim().is_empty() {
        return Err(format!("usage: {USAGE}"));
    }
    let mut request = TaskRequest::new(task.trim());
    for pair in parsed.all("context") {
        let (key, value) = parse_key_value(pair)?;
        request = request.with_context(key, value);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_words_and_context_are_collected() {
        let args: Vec<String> = ["Summarize", "recent", "commits", "--context", "repo=acme/api"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let request = parse_task_request(&args).expect("request");
        assert_eq!(request.task, "Summarize recent commits");
        assert_eq!(request.context.get("repo"), Some(&json!("acme/api")));
    }

    #[test]
    fn empty_task_is_a_usage_error() {
        let err = parse_task_request(&["--context".to_string(), "a=b".to_string()])
            .expect_err("empty");
        assert!(err.starts_with("usage:"));
    }
}
