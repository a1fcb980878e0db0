use crate::app::command_support::to_pretty_json;
use crate::capability::CapabilityRegistry;

pub fn cmd_agents(args: &[String]) -> Result<String, String> {
    let registry = CapabilityRegistry::builtin();
    match args.first().map(String::as_str) {
        None => {
            let mut lines = Vec::new();
            for kind in registry.agents() {
                lines.push(kind.to_string());
                for schema in registry.actions_for(kind) {
                    let args = schema
                        .args
                        .iter()
                        .map(|arg| {
                            if arg.required {
                                arg.name.to_string()
                            } else {
                                format!("[{}]", arg.name)
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    lines.push(format!("  {} {}", schema.action, args).trim_end().to_string());
                }
            }
            Ok(lines.join("\n"))
        }
        Some("--json") if args.len() == 1 => to_pretty_json(&registry.describe()),
        _ => Err("usage: agents [--json]".to_string()),
    }
}
