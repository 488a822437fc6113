//! Out-of-scope node — short streamed redirection for rejected queries.

use tracing::{info, warn};

use crate::llm::ChatMessage;

use super::super::events::{AgentEvent, Cancelled, EventSender};
use super::super::prompts::{self, PromptBuilder};
use super::super::state::{AgentState, AgentStatus};
use super::super::AgentContext;

/// Redirections run warmer than grounded answers.
const OUT_OF_SCOPE_TEMPERATURE: f32 = 0.7;
const REPLY_MAX_TOKENS: u32 = 300;

const STATIC_FALLBACK: &str = "I specialize in AI/ML research papers. How can I help with that?";

pub async fn run(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &EventSender,
) -> Result<(), Cancelled> {
    let (score, reasoning) = state
        .guardrail_result
        .as_ref()
        .map(|g| (g.score, g.reasoning.clone()))
        .unwrap_or((0, String::new()));

    events
        .status(
            "out_of_scope",
            "Query outside supported scope",
            Some(serde_json::json!({ "score": score })),
        )
        .await?;

    let (system, user) = PromptBuilder::new(prompts::OUT_OF_SCOPE_SYSTEM_PROMPT)
        .with_conversation(&state.conversation_history, ctx.options.conversation_window)
        .with_labeled_query("User message", &state.original_query)
        .with_note(format!("Relevance score: {score}/100"))
        .with_note(format!("Reason: {reasoning}"))
        .build();
    let messages = [ChatMessage::system(system), ChatMessage::user(user)];

    let mut reply = String::new();
    match ctx
        .llm
        .stream_tokens(&messages, OUT_OF_SCOPE_TEMPERATURE, Some(REPLY_MAX_TOKENS))
        .await
    {
        Ok(mut stream) => {
            while let Some(item) = stream.recv().await {
                match item {
                    Ok(token) => {
                        reply.push_str(&token);
                        events.emit(AgentEvent::Content { token }).await?;
                    }
                    Err(e) => {
                        warn!(error = %e, "out-of-scope stream failed mid-way");
                        break;
                    }
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "out-of-scope stream could not start");
        }
    }

    // A redirection must always reach the user, provider or not.
    if reply.trim().is_empty() {
        reply = STATIC_FALLBACK.to_string();
        events.emit(AgentEvent::Content { token: reply.clone() }).await?;
    }

    info!(reply_len = reply.len(), "out-of-scope response generated");
    state.final_answer = Some(reply);
    state.status = AgentStatus::Completed;
    state
        .reasoning_steps
        .push("Generated out-of-scope redirection".to_string());
    Ok(())
}
