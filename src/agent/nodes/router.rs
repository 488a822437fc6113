//! Router node — picks the next tool, or hands over to generation.

use tracing::{info, warn};

use crate::llm::ChatMessage;

use super::super::events::{Cancelled, EventSender};
use super::super::prompts;
use super::super::state::{AgentState, RouterDecision};
use super::super::AgentContext;

pub async fn run(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &EventSender,
) -> Result<(), Cancelled> {
    events.status("routing", "Deciding next action", None).await?;

    let remaining = ctx.options.max_iterations.saturating_sub(state.iteration);
    let conversation =
        prompts::conversation_block(&state.conversation_history, ctx.options.conversation_window);
    let tool_history: Vec<(String, bool, String)> = state
        .tool_history
        .iter()
        .map(|t| (t.tool_name.clone(), t.success, t.summary.clone()))
        .collect();

    let user_prompt = prompts::router_user_prompt(
        &state.current_query,
        &ctx.tools.schemas(),
        &tool_history,
        &conversation,
        remaining,
    );
    let messages = [
        ChatMessage::system(prompts::ROUTER_SYSTEM_PROMPT),
        ChatMessage::user(user_prompt),
    ];

    let parsed = match ctx.llm.complete_structured(&messages, 0.0, Some(400)).await {
        Ok(value) => serde_json::from_value::<RouterDecision>(value).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let decision = match parsed {
        Ok(decision) => {
            if decision.should_generate {
                decision
            } else {
                match decision.next_tool.as_deref() {
                    Some(name) if ctx.tools.contains(name) => decision,
                    Some(name) => {
                        // Unregistered tool name: nothing the executor could
                        // run, so answer from what we have.
                        warn!(tool = name, "router chose unregistered tool — forcing generation");
                        state
                            .reasoning_steps
                            .push(format!("Router chose unknown tool '{name}', generating instead"));
                        forced_generation(format!("unknown tool {name}"))
                    }
                    None => {
                        state
                            .reasoning_steps
                            .push("Router returned no tool, generating instead".to_string());
                        forced_generation("no tool named".to_string())
                    }
                }
            }
        }
        Err(error) => {
            warn!(%error, "router LLM call failed — forcing generation");
            state
                .reasoning_steps
                .push(format!("Router failed ({error}), generating with available context"));
            forced_generation(format!("router unavailable: {error}"))
        }
    };

    // Repeated identical calls are allowed but surfaced, so pathological
    // loops show up in reasoning steps before max_iterations catches them.
    if let Some(tool) = decision.next_tool.as_deref() {
        let args = decision.tool_args.clone().unwrap_or(serde_json::json!({}));
        if state
            .tool_history
            .iter()
            .any(|t| t.tool_name == tool && t.args == args)
        {
            state
                .reasoning_steps
                .push(format!("Router repeated {tool} with identical arguments"));
        }
    }

    let action = if decision.should_generate {
        "generate".to_string()
    } else {
        format!("execute {}", decision.next_tool.as_deref().unwrap_or("?"))
    };
    info!(%action, iteration = state.iteration, "router decision");
    state.reasoning_steps.push(format!("Router decision: {action}"));

    events
        .status(
            "routing",
            "Next action decided",
            Some(serde_json::json!({
                "action": action,
                "iteration": state.iteration,
            })),
        )
        .await?;

    state.router_decision = Some(decision);
    Ok(())
}

fn forced_generation(rationale: String) -> RouterDecision {
    RouterDecision {
        next_tool: None,
        tool_args: None,
        rationale,
        should_generate: true,
    }
}
