//! End-to-end state-machine scenarios over a scripted LLM provider and a
//! real (temp-dir) search index. The script queue makes every LLM round
//! deterministic, so these tests pin the exact node walk, counter values,
//! and event ordering.

use std::sync::Arc;

use tempfile::TempDir;

use paperbot::agent::engine;
use paperbot::agent::events::{AgentEvent, EventSender};
use paperbot::agent::state::{AgentOptions, AgentState, AgentStatus};
use paperbot::agent::tools::list_papers::ListPapersTool;
use paperbot::agent::tools::retrieve::RetrieveChunksTool;
use paperbot::agent::tools::web_search::WebSearchTool;
use paperbot::agent::tools::{Tool, ToolRegistry};
use paperbot::agent::AgentContext;
use paperbot::llm::providers::dummy::DummyProvider;
use paperbot::llm::LlmProvider;
use paperbot::search::embeddings::HashedEmbeddings;
use paperbot::search::store::{NewChunk, PaperRecord};
use paperbot::search::{EmbeddingsClient, HybridSearch, PaperStore};

const DIM: usize = 64;

// ── helpers ──────────────────────────────────────────────────────────────────

fn seeded_search(tmp: &TempDir) -> HybridSearch {
    let store = PaperStore::open(&tmp.path().join("papers.db"), DIM).expect("open store");
    let search = HybridSearch::new(store, EmbeddingsClient::Hashed(HashedEmbeddings::new(DIM)));
    search
        .store()
        .upsert_paper(&PaperRecord {
            arxiv_id: "1706.03762".into(),
            title: "Attention Is All You Need".into(),
            authors: vec!["Vaswani".into(), "Shazeer".into()],
            abstract_text: String::new(),
            categories: vec!["cs.CL".into()],
            published_date: Some("2017-06-12".into()),
            pdf_url: Some("https://arxiv.org/pdf/1706.03762.pdf".into()),
            raw_text: String::new(),
            sections: Vec::new(),
        })
        .expect("upsert");
    search
        .store()
        .insert_chunks(
            "1706.03762",
            &[NewChunk {
                chunk_index: 0,
                chunk_text: "scaled dot product attention is the core transformer operation".into(),
                section_name: Some("3.2".into()),
                page_number: Some(4),
                embedding: HashedEmbeddings::new(DIM)
                    .embed_one("scaled dot product attention is the core transformer operation"),
            }],
        )
        .expect("index");
    search
}

fn make_ctx(
    search: HybridSearch,
    script: Vec<&str>,
    top_k: usize,
    max_retrieval_attempts: u32,
    max_iterations: u32,
) -> AgentContext {
    let mut registry = ToolRegistry::new();
    registry
        .register(Tool::RetrieveChunks(RetrieveChunksTool::new(search.clone(), top_k * 2)))
        .expect("register retrieve");
    // Port 1 refuses connections, so this tool always fails fast.
    registry
        .register(Tool::WebSearch(WebSearchTool::new("http://127.0.0.1:1/", 5)))
        .expect("register web_search");
    registry
        .register(Tool::ListPapers(ListPapersTool::new(search)))
        .expect("register list_papers");

    AgentContext {
        llm: LlmProvider::Dummy(DummyProvider::scripted(
            script.into_iter().map(str::to_string).collect(),
        )),
        tools: Arc::new(registry),
        options: AgentOptions {
            provider: Some("dummy".into()),
            model: None,
            temperature: 0.3,
            top_k,
            guardrail_threshold: 75,
            max_retrieval_attempts,
            conversation_window: 5,
            max_iterations,
        },
    }
}

async fn run_engine(state: AgentState, ctx: AgentContext) -> (AgentState, Vec<AgentEvent>) {
    let (events, mut rx) = EventSender::channel();
    let handle = tokio::spawn(async move { engine::run(state, &ctx, &events).await });
    let mut collected = Vec::new();
    while let Some(event) = rx.recv().await {
        collected.push(event);
    }
    (handle.await.expect("engine task"), collected)
}

/// Distinct `status` steps in emission order, consecutive repeats collapsed.
fn step_walk(events: &[AgentEvent]) -> Vec<String> {
    let mut walk: Vec<String> = Vec::new();
    for event in events {
        if let AgentEvent::Status { step, .. } = event {
            if walk.last() != Some(step) {
                walk.push(step.clone());
            }
        }
    }
    walk
}

fn answer_text(events: &[AgentEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Content { token } => Some(token.as_str()),
            _ => None,
        })
        .collect()
}

fn sources_position(events: &[AgentEvent]) -> Option<usize> {
    events.iter().position(|e| matches!(e, AgentEvent::Sources { .. }))
}

fn first_content_position(events: &[AgentEvent]) -> Option<usize> {
    events.iter().position(|e| matches!(e, AgentEvent::Content { .. }))
}

// ── S1: in-scope, one retrieval, graded relevant ─────────────────────────────

#[tokio::test]
async fn in_scope_single_retrieval_flows_to_cited_answer() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    let ctx = make_ctx(
        search,
        vec![
            r#"{"score": 92, "reasoning": "directly about transformers", "is_in_scope": true}"#,
            r#"{"next_tool": "retrieve_chunks", "tool_args": {"query": "attention in transformers"}, "rationale": "search the corpus", "should_generate": false}"#,
            r#"{"is_relevant": true, "reasoning": "describes attention directly"}"#,
            r#"{"should_generate": true, "rationale": "evidence is sufficient"}"#,
            "Attention, introduced in [1706.03762], weighs token interactions.",
        ],
        1,
        3,
        10,
    );

    let state = AgentState::new("What is attention in transformers?", Vec::new(), None);
    let (state, events) = run_engine(state, ctx).await;

    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(state.retrieval_attempts, 1);
    assert_eq!(
        step_walk(&events),
        vec!["guardrail", "routing", "executing", "grading", "routing", "generation"]
    );

    // Sources precede the first content token and carry the grading mark.
    let sources_at = sources_position(&events).expect("sources emitted");
    let content_at = first_content_position(&events).expect("content emitted");
    assert!(sources_at < content_at);
    let AgentEvent::Sources { sources } = &events[sources_at] else {
        unreachable!()
    };
    assert_eq!(sources[0].arxiv_id, "1706.03762");
    assert_eq!(sources[0].was_graded_relevant, Some(true));

    assert!(answer_text(&events).contains("[1706.03762]"));
    assert_eq!(state.guardrail_result.as_ref().map(|g| g.score), Some(92));
}

// ── S2: out of scope ─────────────────────────────────────────────────────────

#[tokio::test]
async fn out_of_scope_streams_redirection_without_sources() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    let ctx = make_ctx(
        search,
        vec![
            r#"{"score": 12, "reasoning": "food question, not AI/ML", "is_in_scope": false}"#,
            "I focus on AI/ML research papers, so pizza is outside my lane.",
        ],
        3,
        3,
        10,
    );

    let state = AgentState::new("Best pizza in Naples?", Vec::new(), None);
    let (state, events) = run_engine(state, ctx).await;

    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(state.retrieval_attempts, 0);
    assert_eq!(step_walk(&events), vec!["guardrail", "out_of_scope"]);
    assert!(sources_position(&events).is_none(), "no sources for rejections");
    assert!(!answer_text(&events).is_empty());
    assert!(state.guardrail_result.as_ref().map(|g| g.score).unwrap() < 75);
}

// ── S3: retry with rewrite ───────────────────────────────────────────────────

#[tokio::test]
async fn irrelevant_first_pass_triggers_rewrite_and_second_retrieval() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    let ctx = make_ctx(
        search,
        vec![
            r#"{"score": 85, "reasoning": "ML adjacent", "is_in_scope": true}"#,
            r#"{"next_tool": "retrieve_chunks", "tool_args": {"query": "attention"}, "rationale": "first pass", "should_generate": false}"#,
            r#"{"is_relevant": false, "reasoning": "chunk covers a different aspect"}"#,
            r#"{"rewritten_query": "transformer scaled dot product attention", "reason": "use paper terminology"}"#,
            r#"{"next_tool": "retrieve_chunks", "tool_args": {"query": "transformer scaled dot product attention"}, "rationale": "retry with precise terms", "should_generate": false}"#,
            r#"{"is_relevant": true, "reasoning": "matches the rewritten query"}"#,
            r#"{"should_generate": true, "rationale": "graded relevant"}"#,
            "With precise terminology the corpus answers the question [1706.03762].",
        ],
        1,
        3,
        10,
    );

    let state = AgentState::new("how do models look at other words", Vec::new(), None);
    let (state, events) = run_engine(state, ctx).await;

    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(state.retrieval_attempts, 2, "two retrievals reached the grader");
    assert_eq!(
        state.rewritten_query(),
        Some("transformer scaled dot product attention")
    );
    let retrievals = state
        .tool_history
        .iter()
        .filter(|t| t.tool_name == "retrieve_chunks" && t.success)
        .count();
    assert_eq!(retrievals, 2);
    assert!(state
        .reasoning_steps
        .iter()
        .any(|s| s.starts_with("Rewrote query:")));
    assert_eq!(
        step_walk(&events),
        vec![
            "guardrail", "routing", "executing", "grading", "routing", "executing", "grading",
            "routing", "generation"
        ]
    );
}

// ── S5: cancellation mid-stream ──────────────────────────────────────────────

#[tokio::test]
async fn dropped_consumer_cancels_the_run() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    let ctx = make_ctx(
        search,
        vec![r#"{"score": 90, "reasoning": "fine", "is_in_scope": true}"#],
        3,
        3,
        10,
    );

    let state = AgentState::new("What is attention?", Vec::new(), None);
    let (events, mut rx) = EventSender::channel();
    let handle = tokio::spawn(async move { engine::run(state, &ctx, &events).await });

    // Take the first event, then hang up.
    let first = rx.recv().await.expect("first event");
    assert_eq!(first.event_type(), "status");
    drop(rx);

    let state = handle.await.expect("engine task");
    assert_eq!(state.status, AgentStatus::Failed);
    assert_eq!(state.failure_reason.as_deref(), Some("cancelled"));
    assert!(state.final_answer.is_none());
}

// ── S6: tool failure then fallback ───────────────────────────────────────────

#[tokio::test]
async fn failed_web_search_is_recorded_and_routed_around() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    let ctx = make_ctx(
        search,
        vec![
            r#"{"score": 90, "reasoning": "recent-news angle on ML", "is_in_scope": true}"#,
            r#"{"next_tool": "web_search", "tool_args": {"query": "latest transformer results"}, "rationale": "needs fresh info", "should_generate": false}"#,
            r#"{"should_generate": true, "rationale": "web search unavailable, answer from knowledge"}"#,
            "The web is unreachable right now, but the corpus still covers the basics.",
        ],
        3,
        3,
        10,
    );

    let state = AgentState::new("What changed in transformers this month?", Vec::new(), None);
    let (state, events) = run_engine(state, ctx).await;

    assert_eq!(state.status, AgentStatus::Completed);
    let failed = state
        .tool_history
        .iter()
        .find(|t| t.tool_name == "web_search")
        .expect("web_search recorded");
    assert!(!failed.success);
    assert!(state
        .reasoning_steps
        .iter()
        .any(|s| s.contains("web_search failed")));
    assert_eq!(
        step_walk(&events),
        vec!["guardrail", "routing", "executing", "routing", "generation"]
    );
}

// ── caps ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn iteration_cap_forces_generation() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    // The router keeps asking for list_papers; the cap cuts it off after two
    // executor passes.
    let ctx = make_ctx(
        search,
        vec![
            r#"{"score": 90, "reasoning": "fine", "is_in_scope": true}"#,
            r#"{"next_tool": "list_papers", "tool_args": {}, "rationale": "look around", "should_generate": false}"#,
            r#"{"next_tool": "list_papers", "tool_args": {}, "rationale": "look again", "should_generate": false}"#,
            r#"{"next_tool": "list_papers", "tool_args": {}, "rationale": "and again", "should_generate": false}"#,
            "Ran out of iterations, answering with what is known.",
        ],
        3,
        3,
        2,
    );

    let state = AgentState::new("enumerate everything", Vec::new(), None);
    let (state, events) = run_engine(state, ctx).await;

    assert_eq!(state.status, AgentStatus::Completed);
    assert!(state.iteration <= 2, "iteration {} exceeded cap", state.iteration);
    assert_eq!(
        state
            .tool_history
            .iter()
            .filter(|t| t.tool_name == "list_papers")
            .count(),
        2,
        "exactly max_iterations executor passes"
    );
    assert!(step_walk(&events).ends_with(&["generation".to_string()]));
    // The repeated identical call was surfaced for loop diagnostics.
    assert!(state
        .reasoning_steps
        .iter()
        .any(|s| s.contains("repeated list_papers")));
}

#[tokio::test]
async fn retrieval_budget_is_never_exceeded() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    // Grader keeps rejecting; with max_retrieval_attempts = 2 the engine must
    // stop rewriting after the second pass and fall through to generation.
    let ctx = make_ctx(
        search,
        vec![
            r#"{"score": 90, "reasoning": "fine", "is_in_scope": true}"#,
            r#"{"next_tool": "retrieve_chunks", "tool_args": {"query": "attention"}, "rationale": "pass 1", "should_generate": false}"#,
            r#"{"is_relevant": false, "reasoning": "off target"}"#,
            r#"{"rewritten_query": "transformer attention", "reason": "narrow"}"#,
            r#"{"next_tool": "retrieve_chunks", "tool_args": {"query": "transformer attention"}, "rationale": "pass 2", "should_generate": false}"#,
            r#"{"is_relevant": false, "reasoning": "still off target"}"#,
            r#"{"should_generate": true, "rationale": "budget exhausted"}"#,
            "Nothing conclusive in the corpus; answering cautiously.",
        ],
        1,
        2,
        10,
    );

    let state = AgentState::new("vague question", Vec::new(), None);
    let (state, _events) = run_engine(state, ctx).await;

    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(state.retrieval_attempts, 2);
    assert!(state.retrieval_attempts <= 2);
}

// ── provider-failure fallbacks ───────────────────────────────────────────────

#[tokio::test]
async fn unparseable_structured_outputs_fall_back_to_generation() {
    let tmp = TempDir::new().expect("tempdir");
    let search = seeded_search(&tmp);
    // Guardrail and router both emit junk twice (initial + retry); the
    // fallbacks keep the run alive all the way to a streamed answer.
    let ctx = make_ctx(
        search,
        vec![
            "not json",
            "still not json",
            "router junk",
            "more router junk",
            "Answering directly despite the noisy provider.",
        ],
        3,
        3,
        10,
    );

    let state = AgentState::new("What is attention?", Vec::new(), None);
    let (state, events) = run_engine(state, ctx).await;

    assert_eq!(state.status, AgentStatus::Completed);
    assert!(state.final_answer.is_some());
    // Fallback guardrail pins score 0 but stays in scope.
    assert_eq!(state.guardrail_result.as_ref().map(|g| g.score), Some(0));
    assert!(state
        .reasoning_steps
        .iter()
        .any(|s| s.contains("Guardrail check failed")));
    assert!(step_walk(&events).contains(&"generation".to_string()));
}
