use crate::orchestration::engine::{clip_to_budget, TraceEntry};
use crate::orchestration::plan::ValidatedStep;
use serde_json::{json, Map, Value};

pub const PLAN_SYSTEM_PROMPT: &str = "You plan tool invocations for an operations assistant. \
Given a task, optional context and the catalog of agents with their actions and arguments, \
reply with a JSON object {\"plan\": [...]} where every element is \
{\"step_id\": <increasing integer>, \"agent\": <agent name>, \"action\": <action name>, \"args\": {...}}. \
Use only catalog actions and argument names. Do not execute anything and do not add prose.";

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You summarize the outcome of executed tool steps. \
Given the task, the executed plan and the step trace, reply with a JSON object \
{\"final_result\": {\"type\": \"text\" | \"structured\", \"content\": ...}, \"warnings\": [...]}. \
Answer the task, list recommended next steps, and call out failed or truncated steps as warnings.";

pub fn plan_user_prompt(task: &str, context: &Map<String, Value>, catalog: &Value) -> String {
    let payload = json!({
        "task": task,
        "context": context,
        "available_agents": catalog,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

/// Trace summaries are clipped again here; the planner never sees more than
/// `budget` characters per step.
pub fn synthesis_user_prompt(
    task: &str,
    plan: &[ValidatedStep],
    trace: &[TraceEntry],
    budget: usize,
) -> String {
    let trace: Vec<Value> = trace
        .iter()
        .map(|entry| {
            let (summary, cut) = clip_to_budget(&entry.response_summary, budget);
            json!({
                "step_id": entry.step_id,
                "agent": entry.agent,
                "action": entry.action,
                "response_summary": summary,
                "truncated": cut || entry.truncated,
                "duration_ms": entry.duration_ms,
                "warnings": entry.warnings,
            })
        })
        .collect();
    let payload = json!({
        "task": task,
        "plan": plan,
        "trace": trace,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

/// Strips a surrounding Markdown code fence if the model added one.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}
