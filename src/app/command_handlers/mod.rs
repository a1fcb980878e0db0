use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::app::command_support::split_global_options;

pub mod agents;
pub mod poc;
pub mod task;
pub mod trace;
pub mod users;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let (context, args) = split_global_options(args)?;
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Task => task::cmd_task(&context, &args[1..]),
        CliVerb::Trace => trace::cmd_trace(&context, &args[1..]),
        CliVerb::User => users::cmd_user(&context, &args[1..]),
        CliVerb::Poc => poc::cmd_poc(&context, &args[1..]),
        CliVerb::Agents => agents::cmd_agents(&args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
