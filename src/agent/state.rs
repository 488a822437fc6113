//! Agent state and structured LLM output types.
//!
//! [`AgentState`] is the single record the execution engine threads through
//! its nodes. The `*Scoring`/`*Decision`/`*Result` structs are the schemas
//! the engine expects back from structured LLM calls; they deserialize from
//! the JSON object the provider layer extracts.

use serde::{Deserialize, Serialize};

use crate::config::AgentDefaults;
use crate::error::AppError;
use crate::memory::SourceRecord;

use super::tools::retrieve::RetrievedChunk;

// ── Structured LLM outputs ────────────────────────────────────────────────────

/// Guardrail verdict: how in-scope the query is for the paper corpus.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailScoring {
    pub score: u8,
    #[serde(default)]
    pub reasoning: String,
    /// Derived locally as `score >= threshold`; the model's own claim is
    /// accepted as a default but the threshold comparison wins.
    #[serde(default)]
    pub is_in_scope: bool,
}

/// Router verdict: which tool to run next, or generate now.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterDecision {
    #[serde(default)]
    pub next_tool: Option<String>,
    #[serde(default)]
    pub tool_args: Option<serde_json::Value>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub should_generate: bool,
}

/// Grader verdict for one chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct GradingResult {
    pub is_relevant: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Rewriter output.
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteResult {
    pub rewritten_query: String,
    #[serde(default)]
    pub reason: String,
}

// ── State ─────────────────────────────────────────────────────────────────────

/// One message of flattened conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

/// One completed tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolExecution {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub success: bool,
    pub summary: String,
    pub started_at: String,
    pub ended_at: String,
}

/// A retrieved chunk with its grading mark.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: RetrievedChunk,
    pub was_graded_relevant: Option<bool>,
}

/// One grading verdict kept for the rewriter's feedback block.
#[derive(Debug, Clone)]
pub struct GradingFeedback {
    pub arxiv_id: String,
    pub is_relevant: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
}

/// The state-machine record for one request.
#[derive(Debug)]
pub struct AgentState {
    pub original_query: String,
    /// Equals `original_query` unless the rewriter replaced it.
    pub current_query: String,
    pub conversation_history: Vec<ConversationMessage>,
    pub session_id: Option<String>,
    pub guardrail_result: Option<GuardrailScoring>,
    pub router_decision: Option<RouterDecision>,
    pub tool_history: Vec<ToolExecution>,
    /// Current best evidence, ordered by score descending, unioned by
    /// `(arxiv_id, chunk_index)` with the maximum score per key.
    pub relevant_chunks: Vec<ScoredChunk>,
    /// Verdicts from the most recent grading pass.
    pub grading_feedback: Vec<GradingFeedback>,
    pub iteration: u32,
    pub retrieval_attempts: u32,
    pub status: AgentStatus,
    pub reasoning_steps: Vec<String>,
    pub final_answer: Option<String>,
    pub sources: Option<Vec<SourceRecord>>,
    /// Set when the engine failed (e.g. `"cancelled"`).
    pub failure_reason: Option<String>,
}

impl AgentState {
    pub fn new(
        query: impl Into<String>,
        history: Vec<ConversationMessage>,
        session_id: Option<String>,
    ) -> Self {
        let query = query.into();
        Self {
            current_query: query.clone(),
            original_query: query,
            conversation_history: history,
            session_id,
            guardrail_result: None,
            router_decision: None,
            tool_history: Vec::new(),
            relevant_chunks: Vec::new(),
            grading_feedback: Vec::new(),
            iteration: 0,
            retrieval_attempts: 0,
            status: AgentStatus::Running,
            reasoning_steps: Vec::new(),
            final_answer: None,
            sources: None,
            failure_reason: None,
        }
    }

    /// The query retrieval should use right now.
    pub fn rewritten_query(&self) -> Option<&str> {
        if self.current_query != self.original_query {
            Some(&self.current_query)
        } else {
            None
        }
    }

    /// Count of chunks the grader marked relevant.
    pub fn graded_relevant_count(&self) -> usize {
        self.relevant_chunks
            .iter()
            .filter(|c| c.was_graded_relevant == Some(true))
            .count()
    }

    /// Source records for the best `top_k` chunks, in evidence order.
    pub fn build_sources(&self, top_k: usize) -> Vec<SourceRecord> {
        self.relevant_chunks
            .iter()
            .take(top_k)
            .map(|c| SourceRecord {
                arxiv_id: c.chunk.arxiv_id.clone(),
                title: c.chunk.title.clone(),
                authors: c.chunk.authors.clone(),
                pdf_url: c.chunk.pdf_url.clone(),
                relevance_score: c.chunk.score,
                published_date: c.chunk.published_date.clone(),
                was_graded_relevant: c.was_graded_relevant,
            })
            .collect()
    }
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Per-request agent options: config defaults plus request overrides.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub top_k: usize,
    pub guardrail_threshold: u8,
    pub max_retrieval_attempts: u32,
    pub conversation_window: usize,
    pub max_iterations: u32,
}

impl AgentOptions {
    pub fn from_defaults(defaults: &AgentDefaults) -> Self {
        Self {
            provider: None,
            model: None,
            temperature: defaults.temperature,
            top_k: defaults.top_k,
            guardrail_threshold: defaults.guardrail_threshold,
            max_retrieval_attempts: defaults.max_retrieval_attempts,
            conversation_window: defaults.conversation_window,
            max_iterations: defaults.max_iterations,
        }
    }

    /// Reject out-of-range values before the engine starts.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=10).contains(&self.top_k) {
            return Err(AppError::Agent(format!("top_k must be in 1..=10, got {}", self.top_k)));
        }
        if self.guardrail_threshold > 100 {
            return Err(AppError::Agent(format!(
                "guardrail_threshold must be in 0..=100, got {}",
                self.guardrail_threshold
            )));
        }
        if !(1..=5).contains(&self.max_retrieval_attempts) {
            return Err(AppError::Agent(format!(
                "max_retrieval_attempts must be in 1..=5, got {}",
                self.max_retrieval_attempts
            )));
        }
        if !(1..=10).contains(&self.conversation_window) {
            return Err(AppError::Agent(format!(
                "conversation_window must be in 1..=10, got {}",
                self.conversation_window
            )));
        }
        if self.max_iterations == 0 {
            return Err(AppError::Agent("max_iterations must be >= 1".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::Agent(format!(
                "temperature must be in 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}
