use crate::app::command_support::{CliContext, FlagArgs};
use crate::onboarding::PocRoutingRule;

const ADD_USAGE: &str = "poc add --role <role> --team <team> --item <access_item> --poc <poc_id>";

pub fn cmd_poc(context: &CliContext, args: &[String]) -> Result<String, String> {
    match args.first().map(String::as_str) {
        Some("add") => {
            let flags = FlagArgs::parse(&args[1..])?;
            flags.reject_unknown(&["role", "team", "item", "poc"])?;
            let rule = PocRoutingRule {
                role: flags.required("role", ADD_USAGE)?,
                team: flags.required("team", ADD_USAGE)?,
                access_item: flags.required("item", ADD_USAGE)?,
                poc_id: flags.required("poc", ADD_USAGE)?,
            };
            let store = context.runtime()?.user_store().map_err(|e| e.to_string())?;
            let added = store.add_route(&rule).map_err(|e| e.to_string())?;
            Ok(format!(
                "{}\nrole={}\nteam={}\nitem={}\npoc={}",
                if added { "route added" } else { "route already present" },
                rule.role,
                rule.team,
                rule.access_item,
                rule.poc_id
            ))
        }
        Some("list") if args.len() == 1 => {
            let store = context.runtime()?.user_store().map_err(|e| e.to_string())?;
            let routes = store.list_routes().map_err(|e| e.to_string())?;
            Ok(routes
                .iter()
                .map(|rule| {
                    format!(
                        "team={} role={} item={} poc={}",
                        rule.team, rule.role, rule.access_item, rule.poc_id
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        _ => Err(format!("usage: {ADD_USAGE} | poc list")),
    }
}
