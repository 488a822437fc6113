//! Grader node — marks each retrieved chunk relevant or not to the query.

use tracing::{info, warn};

use crate::llm::ChatMessage;

use super::super::events::{Cancelled, EventSender};
use super::super::prompts;
use super::super::state::{AgentState, GradingFeedback, GradingResult};
use super::super::AgentContext;

pub async fn run(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &EventSender,
) -> Result<(), Cancelled> {
    let total = state.relevant_chunks.len();
    events
        .status(
            "grading",
            "Grading retrieved documents",
            Some(serde_json::json!({ "chunks": total })),
        )
        .await?;

    let mut feedback = Vec::with_capacity(total);

    for i in 0..state.relevant_chunks.len() {
        let (arxiv_id, chunk_text) = {
            let c = &state.relevant_chunks[i].chunk;
            (c.arxiv_id.clone(), c.chunk_text.clone())
        };
        let prompt = prompts::grading_prompt(&state.current_query, &arxiv_id, &chunk_text);
        let messages = [ChatMessage::user(prompt)];

        let verdict = match ctx.llm.complete_structured(&messages, 0.0, Some(200)).await {
            Ok(value) => match serde_json::from_value::<GradingResult>(value) {
                Ok(v) => v,
                Err(e) => grading_fallback(&arxiv_id, &e.to_string()),
            },
            Err(e) => grading_fallback(&arxiv_id, &e.to_string()),
        };

        state.relevant_chunks[i].was_graded_relevant = Some(verdict.is_relevant);
        feedback.push(GradingFeedback {
            arxiv_id,
            is_relevant: verdict.is_relevant,
            reasoning: verdict.reasoning,
        });
    }

    // Graded-relevant evidence first; score order within each group is
    // preserved so the generator sees the strongest chunks.
    state
        .relevant_chunks
        .sort_by_key(|c| c.was_graded_relevant != Some(true));

    let relevant = state.graded_relevant_count();
    info!(relevant, total, "grading complete");
    state
        .reasoning_steps
        .push(format!("Graded documents ({relevant}/{total} relevant)"));
    state.grading_feedback = feedback;

    events
        .status(
            "grading",
            "Documents graded",
            Some(serde_json::json!({ "relevant": relevant, "total": total })),
        )
        .await?;

    Ok(())
}

/// Grader failure accepts the chunk: losing evidence to a flaky provider is
/// worse than passing an occasional weak chunk to the generator.
fn grading_fallback(arxiv_id: &str, error: &str) -> GradingResult {
    warn!(arxiv_id, %error, "grading call failed — accepting chunk");
    GradingResult {
        is_relevant: true,
        reasoning: format!("grader unavailable: {error}"),
    }
}
