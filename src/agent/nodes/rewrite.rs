//! Rewriter node — reformulates the query after an unproductive retrieval.

use tracing::{info, warn};

use crate::llm::ChatMessage;

use super::super::events::{Cancelled, EventSender};
use super::super::prompts;
use super::super::state::{AgentState, RewriteResult};
use super::super::AgentContext;

/// How many grading verdicts feed the rewrite prompt.
const FEEDBACK_LINES: usize = 3;

pub async fn run(
    state: &mut AgentState,
    ctx: &AgentContext,
    _events: &EventSender,
) -> Result<(), Cancelled> {
    let feedback = state
        .grading_feedback
        .iter()
        .take(FEEDBACK_LINES)
        .map(|f| {
            let verdict = if f.is_relevant { "RELEVANT" } else { "NOT RELEVANT" };
            format!("- Chunk from {}: {verdict} - {}", f.arxiv_id, f.reasoning)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = prompts::rewrite_prompt(&state.original_query, &feedback);
    let messages = [ChatMessage::user(prompt)];

    match ctx.llm.complete_structured(&messages, 0.5, Some(200)).await {
        Ok(value) => match serde_json::from_value::<RewriteResult>(value) {
            Ok(result) if !result.rewritten_query.trim().is_empty() => {
                info!(rewritten = %result.rewritten_query, "query rewritten");
                state.current_query = result.rewritten_query.trim().to_string();
                state
                    .reasoning_steps
                    .push(format!("Rewrote query: '{}'", state.current_query));
            }
            Ok(_) => {
                state
                    .reasoning_steps
                    .push("Rewriter returned an empty query, keeping current".to_string());
            }
            Err(e) => keep_query(state, &e.to_string()),
        },
        Err(e) => keep_query(state, &e.to_string()),
    }

    Ok(())
}

/// Rewrite failure keeps the current query; the router still gets another
/// chance to act within the iteration budget.
fn keep_query(state: &mut AgentState, error: &str) {
    warn!(%error, "rewrite call failed — keeping current query");
    state
        .reasoning_steps
        .push(format!("Query rewrite failed ({error}), keeping current query"));
}
