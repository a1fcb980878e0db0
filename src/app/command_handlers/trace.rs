use crate::app::command_support::{to_pretty_json, CliContext};
use crate::shared::ids::RequestId;

pub fn cmd_trace(context: &CliContext, args: &[String]) -> Result<String, String> {
    match args {
        [verb, id] if verb == "show" => {
            let request_id = RequestId::parse(id)?;
            let store = context.runtime()?.trace_store();
            match store.load(&request_id).map_err(|e| e.to_string())? {
                Some(record) => to_pretty_json(&record),
                None => Err(format!("no trace for request `{request_id}`")),
            }
        }
        [verb] if verb == "list" => {
            let store = context.runtime()?.trace_store();
            let ids = store.list().map_err(|e| e.to_string())?;
            Ok(ids
                .iter()
                .map(RequestId::to_string)
                .collect::<Vec<_>>()
                .join("\n"))
        }
        _ => Err("usage: trace <show <request_id>|list>".to_string()),
    }
}
