//! Guardrail node — scores whether the query belongs to the paper corpus.

use tracing::{info, warn};

use crate::llm::ChatMessage;

use super::super::events::{Cancelled, EventSender};
use super::super::prompts;
use super::super::state::{AgentState, GuardrailScoring};
use super::super::AgentContext;

pub async fn run(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &EventSender,
) -> Result<(), Cancelled> {
    events.status("guardrail", "Validating query scope", None).await?;

    let prompt = prompts::guardrail_prompt(&state.current_query, ctx.options.guardrail_threshold);
    let messages = [ChatMessage::user(prompt)];

    let parsed = match ctx.llm.complete_structured(&messages, 0.0, Some(300)).await {
        Ok(value) => serde_json::from_value::<GuardrailScoring>(value).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let result = match parsed {
        Ok(mut scoring) => {
            // The threshold comparison is authoritative regardless of what
            // the model claimed.
            scoring.is_in_scope = scoring.score >= ctx.options.guardrail_threshold;
            scoring
        }
        Err(error) => {
            // A flaky provider must never block a legitimate question:
            // default to in-scope with score 0.
            warn!(%error, "guardrail check failed — defaulting to in-scope");
            state
                .reasoning_steps
                .push(format!("Guardrail check failed ({error}), continuing in-scope"));
            GuardrailScoring {
                score: 0,
                reasoning: format!("guardrail unavailable: {error}"),
                is_in_scope: true,
            }
        }
    };

    info!(score = result.score, in_scope = result.is_in_scope, "guardrail scored query");
    state
        .reasoning_steps
        .push(format!("Validated query scope (score: {}/100)", result.score));

    events
        .status(
            "guardrail",
            "Query scope validated",
            Some(serde_json::json!({ "score": result.score, "in_scope": result.is_in_scope })),
        )
        .await?;

    state.guardrail_result = Some(result);
    Ok(())
}
