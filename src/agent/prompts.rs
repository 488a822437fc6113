//! Prompt templates and the block-based prompt builder.
//!
//! Templates are plain consts; the only interpolation is fixed marker
//! substitution (scores, thresholds, tool listings). [`PromptBuilder`]
//! assembles the user text from optional blocks in a fixed order —
//! conversation, retrieved context, query, notes — so identical inputs
//! always produce byte-identical prompts.

use super::state::ConversationMessage;
use super::tools::retrieve::RetrievedChunk;

/// Per-message cap applied when history is injected into a prompt.
const HISTORY_MESSAGE_CAP: usize = 500;

// ── System templates ──────────────────────────────────────────────────────────

pub const ANSWER_SYSTEM_PROMPT: &str = "\
You are a research assistant specializing in AI/ML papers.
Answer questions based ONLY on the provided context from research papers.
Cite sources using [arxiv_id] format.
Be precise, technical, and thorough.";

pub const OUT_OF_SCOPE_SYSTEM_PROMPT: &str = "\
You are an AI/ML research assistant.
The user's query is outside your scope. Generate a helpful response that:

1. Acknowledges their message naturally (don't be robotic)
2. References the conversation topic if relevant
3. Explains your focus on AI/ML research papers
4. Suggests a relevant angle if their query could relate to AI/ML

Keep response to 2-3 sentences. Be warm but direct.";

pub const ROUTER_SYSTEM_PROMPT: &str = "\
You are the routing brain of a research-paper assistant.
Decide the single next action: call one of the available tools, or generate
the final answer from the evidence gathered so far.

Respond with a JSON object:
- next_tool: tool name to call, or null
- tool_args: JSON object of arguments for that tool, or null
- rationale: one sentence explaining the choice
- should_generate: true when it is time to answer instead of calling a tool

Prefer retrieving from the paper database before answering. Use web_search
only for recent developments the database cannot cover. When the evidence is
sufficient, or no tool would help, set should_generate to true.";

// ── Prompt functions ──────────────────────────────────────────────────────────

/// Guardrail validation prompt.
pub fn guardrail_prompt(query: &str, threshold: u8) -> String {
    format!(
        "You are a query relevance validator for an AI/ML research paper database.

Score this query on a scale of 0-100:
- 100: Directly about AI/ML research (models, techniques, theory)
- 75-99: Related to AI/ML (applications, datasets, benchmarks)
- 50-74: Tangentially related (computing, statistics)
- 0-49: Not related to AI/ML

Query: {query}

Provide a JSON object with:
- score: Integer 0-100
- reasoning: Brief explanation (1-2 sentences)
- is_in_scope: Boolean (true if score >= {threshold})"
    )
}

/// Chunk grading prompt.
pub fn grading_prompt(query: &str, arxiv_id: &str, chunk_text: &str) -> String {
    format!(
        "Is this chunk relevant to the query?

Query: {query}

Chunk (from paper {arxiv_id}):
{}...

Respond with a JSON object with:
- is_relevant: Boolean (true if this chunk helps answer the query)
- reasoning: Brief explanation (1 sentence)",
        truncate(chunk_text, HISTORY_MESSAGE_CAP)
    )
}

/// Query rewrite prompt.
pub fn rewrite_prompt(original_query: &str, feedback: &str) -> String {
    format!(
        "The original query did not retrieve enough relevant documents.

Original Query: {original_query}

Retrieval Feedback:
{feedback}

Rewrite the query to improve retrieval. Focus on:
- Technical terminology used in research papers
- Specific AI/ML concepts
- Key terms that would appear in relevant papers

Respond with a JSON object with:
- rewritten_query: the improved query
- reason: one sentence on what changed"
    )
}

/// Router user prompt: tools, history, remaining budget, then the question.
pub fn router_user_prompt(
    query: &str,
    tool_schemas: &serde_json::Value,
    tool_history: &[(String, bool, String)],
    conversation_block: &str,
    remaining_iterations: u32,
) -> String {
    let mut prompt = String::new();

    if !conversation_block.is_empty() {
        prompt.push_str(conversation_block);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Available tools:\n");
    prompt.push_str(
        &serde_json::to_string_pretty(tool_schemas).unwrap_or_else(|_| "[]".to_string()),
    );
    prompt.push_str("\n\n");

    if tool_history.is_empty() {
        prompt.push_str("No tools have been called yet.\n\n");
    } else {
        prompt.push_str("Tool calls so far:\n");
        for (name, success, summary) in tool_history {
            let outcome = if *success { "ok" } else { "failed" };
            prompt.push_str(&format!("- {name} [{outcome}]: {summary}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Remaining iterations: {remaining_iterations}\n\n"));
    prompt.push_str(&format!("Question: {query}"));
    prompt
}

/// Format history as the conversation block used by router and generator.
///
/// Last `window` turns (`window * 2` messages), each truncated to 500 chars.
/// Empty history yields an empty string and the block is omitted entirely.
pub fn conversation_block(history: &[ConversationMessage], window: usize) -> String {
    let keep = window.saturating_mul(2);
    let start = history.len().saturating_sub(keep);
    let recent = &history[start..];
    if recent.is_empty() {
        return String::new();
    }

    let mut lines = vec!["Previous conversation:".to_string()];
    for msg in recent {
        let prefix = if msg.role == "user" { "User" } else { "Assistant" };
        let mut content = truncate(&msg.content, HISTORY_MESSAGE_CAP).to_string();
        if msg.content.chars().count() > HISTORY_MESSAGE_CAP {
            content.push_str("...");
        }
        lines.push(format!("{prefix}: {content}"));
    }
    lines.join("\n")
}

/// Character-boundary-safe prefix of at most `max` chars.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Assembles `(system_text, user_text)` from fixed-order blocks.
pub struct PromptBuilder {
    system: String,
    conversation: Option<String>,
    context: Option<String>,
    query: Option<String>,
    notes: Vec<String>,
}

impl PromptBuilder {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            conversation: None,
            context: None,
            query: None,
            notes: Vec::new(),
        }
    }

    /// Add the conversation block; skipped when `history` is empty.
    pub fn with_conversation(mut self, history: &[ConversationMessage], window: usize) -> Self {
        let block = conversation_block(history, window);
        if !block.is_empty() {
            self.conversation = Some(block);
        }
        self
    }

    /// Add the retrieved-context block; skipped when `chunks` is empty.
    /// Each chunk renders as `[arxiv_id] title` followed by its text.
    pub fn with_retrieval_context(mut self, chunks: &[&RetrievedChunk]) -> Self {
        if chunks.is_empty() {
            return self;
        }
        let rendered = chunks
            .iter()
            .map(|c| format!("[{}] {}\n{}", c.arxiv_id, c.title, c.chunk_text))
            .collect::<Vec<_>>()
            .join("\n\n");
        self.context = Some(format!("Context from research papers:\n{rendered}"));
        self
    }

    /// Add the query block with the default `Question:` label.
    pub fn with_query(self, query: &str) -> Self {
        self.with_labeled_query("Question", query)
    }

    /// Add the query block with a caller-chosen label.
    pub fn with_labeled_query(mut self, label: &str, query: &str) -> Self {
        self.query = Some(format!("{label}: {query}"));
        self
    }

    /// Append a short directive note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Join the blocks: conversation, context, query, notes.
    pub fn build(self) -> (String, String) {
        let mut parts = Vec::new();
        if let Some(conversation) = self.conversation {
            parts.push(conversation);
        }
        if let Some(context) = self.context {
            parts.push(context);
        }
        if let Some(query) = self.query {
            parts.push(query);
        }
        for note in self.notes {
            parts.push(format!("Note: {note}"));
        }
        (self.system, parts.join("\n\n"))
    }
}
