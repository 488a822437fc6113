//! Agent service — per-request orchestration around the engine.
//!
//! `ask` validates the request, loads history, builds the per-request
//! context, and spawns the engine task. The caller gets the receiving half
//! of the event channel immediately; the task streams events into it, then
//! persists the turn and appends the `metadata`/`done` tail. Dropping the
//! receiver (client disconnect) cancels the run — nothing is persisted.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::llm::providers;
use crate::memory::{ConversationStore, ConversationTurnRecord, TurnData};
use crate::search::HybridSearch;

use super::engine;
use super::events::{AgentEvent, EventSender, MetadataPayload};
use super::state::{AgentOptions, AgentState, AgentStatus, ConversationMessage};
use super::tools::list_papers::ListPapersTool;
use super::tools::retrieve::RetrieveChunksTool;
use super::tools::summarize_paper::SummarizePaperTool;
use super::tools::web_search::WebSearchTool;
use super::tools::{Tool, ToolRegistry};
use super::AgentContext;

// ── Request ───────────────────────────────────────────────────────────────────

/// Body of `POST /stream`; every knob is optional except the query.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub guardrail_threshold: Option<u8>,
    #[serde(default)]
    pub max_retrieval_attempts: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_window: Option<usize>,
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct AgentService {
    config: Arc<Config>,
    tools: Arc<ToolRegistry>,
    conversations: ConversationStore,
}

impl AgentService {
    /// Build the service and its process-wide tool registry.
    ///
    /// Registration happens here, once, before any engine run — the registry
    /// is read-only afterwards.
    pub fn new(
        config: Arc<Config>,
        search: HybridSearch,
        conversations: ConversationStore,
    ) -> Result<Self, AppError> {
        let mut registry = ToolRegistry::new();
        // Retrieval fetches beyond top_k so grading has something to discard.
        registry.register(Tool::RetrieveChunks(RetrieveChunksTool::new(
            search.clone(),
            config.agent.top_k * 2,
        )))?;
        registry.register(Tool::WebSearch(WebSearchTool::with_defaults()))?;
        // Summaries run on the process-default provider, built once here.
        let default_llm = providers::build(&config.llm, None, None, config.llm_api_key.clone())?;
        registry.register(Tool::SummarizePaper(SummarizePaperTool::new(
            search.store().clone(),
            default_llm,
        )))?;
        registry.register(Tool::ListPapers(ListPapersTool::new(search)))?;

        Ok(Self {
            config,
            tools: Arc::new(registry),
            conversations,
        })
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Start one agent run and return its event stream.
    ///
    /// Validation failures surface here, before any event is emitted, so the
    /// HTTP layer can still answer with a plain 400.
    pub fn ask(&self, request: AskRequest) -> Result<mpsc::Receiver<AgentEvent>, AppError> {
        if request.query.trim().is_empty() {
            return Err(AppError::Agent("query must not be empty".into()));
        }

        let mut options = AgentOptions::from_defaults(&self.config.agent);
        options.provider = request.provider.clone();
        options.model = request.model.clone();
        if let Some(v) = request.top_k {
            options.top_k = v;
        }
        if let Some(v) = request.guardrail_threshold {
            options.guardrail_threshold = v;
        }
        if let Some(v) = request.max_retrieval_attempts {
            options.max_retrieval_attempts = v;
        }
        if let Some(v) = request.temperature {
            options.temperature = v;
        }
        if let Some(v) = request.conversation_window {
            options.conversation_window = v;
        }
        options.validate()?;

        let llm = providers::build(
            &self.config.llm,
            request.provider.as_deref(),
            request.model.as_deref(),
            self.config.llm_api_key.clone(),
        )?;

        let history = match &request.session_id {
            Some(session_id) => {
                let turns = self
                    .conversations
                    .get_history(session_id, options.conversation_window)?;
                flatten_history(&turns)
            }
            None => Vec::new(),
        };

        info!(
            query = %request.query.chars().take(100).collect::<String>(),
            provider = llm.name(),
            session_id = ?request.session_id,
            history_messages = history.len(),
            "agent run starting"
        );

        let state = AgentState::new(request.query, history, request.session_id);
        let ctx = AgentContext {
            llm,
            tools: Arc::clone(&self.tools),
            options,
        };

        let (events, rx) = EventSender::channel();
        let conversations = self.conversations.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let state = engine::run(state, &ctx, &events).await;
            finalize(state, &ctx, &events, &conversations, started).await;
        });

        Ok(rx)
    }
}

/// Turn persisted history into the alternating message list nodes consume.
fn flatten_history(turns: &[ConversationTurnRecord]) -> Vec<ConversationMessage> {
    let mut messages = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        messages.push(ConversationMessage {
            role: "user".to_string(),
            content: turn.user_query.clone(),
        });
        messages.push(ConversationMessage {
            role: "assistant".to_string(),
            content: turn.agent_response.clone(),
        });
    }
    messages
}

/// Terminal handling: persist the turn, emit `metadata` and `done`.
async fn finalize(
    state: AgentState,
    ctx: &AgentContext,
    events: &EventSender,
    conversations: &ConversationStore,
    started: Instant,
) {
    match state.status {
        AgentStatus::Failed => {
            if state.failure_reason.as_deref() == Some("cancelled") {
                // Consumer is gone; emitting anything would fail anyway.
                info!("run cancelled — no turn persisted");
                return;
            }
            // The failing node already emitted its error event.
            let _ = events.emit(AgentEvent::Done).await;
        }
        AgentStatus::Completed => {
            let mut turn_number: i64 = 0;
            let mut persist_error: Option<AppError> = None;

            if let Some(session_id) = &state.session_id {
                let turn = TurnData {
                    user_query: state.original_query.clone(),
                    agent_response: state.final_answer.clone().unwrap_or_default(),
                    provider: ctx.llm.name().to_string(),
                    model: ctx.llm.model().to_string(),
                    guardrail_score: state.guardrail_result.as_ref().map(|g| g.score),
                    retrieval_attempts: state.retrieval_attempts,
                    rewritten_query: state.rewritten_query().map(str::to_string),
                    sources: state.sources.clone().unwrap_or_default(),
                    reasoning_steps: state.reasoning_steps.clone(),
                };
                match conversations.save_turn(session_id, &turn) {
                    Ok(saved) => turn_number = saved.turn_number as i64,
                    Err(e) => {
                        // The answer already streamed; report, don't retract.
                        warn!(error = %e, session_id, "turn persistence failed");
                        turn_number = -1;
                        persist_error = Some(e);
                    }
                }
            }

            let metadata = MetadataPayload {
                query: state.original_query.clone(),
                execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                retrieval_attempts: state.retrieval_attempts,
                rewritten_query: state.rewritten_query().map(str::to_string),
                guardrail_score: state.guardrail_result.as_ref().map(|g| g.score),
                provider: ctx.llm.name().to_string(),
                model: ctx.llm.model().to_string(),
                session_id: state.session_id.clone(),
                turn_number,
                reasoning_steps: state.reasoning_steps.clone(),
            };

            if events.emit(AgentEvent::Metadata(metadata)).await.is_err() {
                return;
            }
            if let Some(e) = persist_error {
                let _ = events
                    .emit(AgentEvent::Error {
                        error: e.to_string(),
                        code: Some("persistence_failed".to_string()),
                    })
                    .await;
            }
            let _ = events.emit(AgentEvent::Done).await;
        }
        AgentStatus::Running => {
            // The engine only returns terminal states; treat as a defect.
            warn!("engine returned in running state");
            let _ = events
                .emit(AgentEvent::Error {
                    error: "engine ended without a terminal state".to_string(),
                    code: None,
                })
                .await;
            let _ = events.emit(AgentEvent::Done).await;
        }
    }
}
