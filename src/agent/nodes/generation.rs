//! Generator node — streams the grounded answer token by token.

use tracing::{error, info};

use crate::llm::ChatMessage;

use super::super::events::{AgentEvent, Cancelled, EventSender};
use super::super::prompts::{self, PromptBuilder};
use super::super::state::{AgentState, AgentStatus};
use super::super::AgentContext;

const ANSWER_MAX_TOKENS: u32 = 1000;

pub async fn run(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &EventSender,
) -> Result<(), Cancelled> {
    events.status("generation", "Generating answer", None).await?;

    let top_k = ctx.options.top_k;
    let chunks: Vec<_> = state
        .relevant_chunks
        .iter()
        .take(top_k)
        .map(|c| &c.chunk)
        .collect();

    let mut builder = PromptBuilder::new(prompts::ANSWER_SYSTEM_PROMPT)
        .with_conversation(&state.conversation_history, ctx.options.conversation_window)
        .with_retrieval_context(&chunks)
        .with_query(&state.current_query);
    if state.retrieval_attempts == ctx.options.max_retrieval_attempts && chunks.len() < top_k {
        builder = builder.with_note("Limited sources found. Acknowledge gaps if needed.");
    }
    let (system, user) = builder.build();

    // Sources precede the first content token.
    let sources = state.build_sources(top_k);
    state.sources = Some(sources.clone());
    events.emit(AgentEvent::Sources { sources }).await?;

    let messages = [ChatMessage::system(system), ChatMessage::user(user)];
    let stream = ctx
        .llm
        .stream_tokens(&messages, ctx.options.temperature, Some(ANSWER_MAX_TOKENS))
        .await;

    let mut stream = match stream {
        Ok(s) => s,
        Err(e) => return fail(state, events, &e.to_string()).await,
    };

    let mut answer = String::new();
    while let Some(item) = stream.recv().await {
        match item {
            Ok(token) => {
                answer.push_str(&token);
                events.emit(AgentEvent::Content { token }).await?;
            }
            Err(e) => return fail(state, events, &e.to_string()).await,
        }
    }

    if answer.trim().is_empty() {
        return fail(state, events, "provider produced an empty answer").await;
    }

    info!(answer_len = answer.len(), "answer generated");
    state.final_answer = Some(answer);
    state.status = AgentStatus::Completed;
    state
        .reasoning_steps
        .push("Generated answer with conversation context".to_string());
    Ok(())
}

/// Generator failure is fatal: no partial answer is finalized and no turn
/// will be persisted. The error rides the stream before `done`.
async fn fail(
    state: &mut AgentState,
    events: &EventSender,
    message: &str,
) -> Result<(), Cancelled> {
    error!(%message, "generation failed");
    state.status = AgentStatus::Failed;
    state.failure_reason = Some(message.to_string());
    state.reasoning_steps.push(format!("Generation failed: {message}"));
    events
        .emit(AgentEvent::Error {
            error: message.to_string(),
            code: Some("generation_failed".to_string()),
        })
        .await
}
