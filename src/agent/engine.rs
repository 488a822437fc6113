//! Execution engine — a bounded state machine over the graph nodes.
//!
//! ```text
//! START → GUARDRAIL → (OUT_OF_SCOPE | ROUTER)
//! ROUTER → (EXECUTOR | GENERATOR)
//! EXECUTOR → (GRADER | ROUTER)
//! GRADER → (REWRITER | ROUTER)
//! REWRITER → ROUTER
//! GENERATOR, OUT_OF_SCOPE → END
//! ```
//!
//! Transitions live in [`next_node`], a pure function of the state, so the
//! iteration and retrieval caps are directly inspectable in tests. The run
//! loop owns the counters: `iteration` increments exactly when the router
//! hands off to the executor, before that transition is taken.
//!
//! Cancellation: every node emits through the event channel; when the
//! consumer hangs up a node returns `Err(Cancelled)` and the loop marks the
//! state failed with reason `"cancelled"` without running further nodes.

use tracing::{debug, warn};

use super::events::EventSender;
use super::nodes;
use super::state::{AgentState, AgentStatus};
use super::tools::retrieve;
use super::AgentContext;

/// The nodes of the graph plus the terminal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Guardrail,
    Router,
    Executor,
    Grader,
    Rewriter,
    Generator,
    OutOfScope,
    End,
}

/// The transition table. Pure: reads the state, never mutates it.
pub fn next_node(current: Node, state: &AgentState, ctx: &AgentContext) -> Node {
    match current {
        Node::Guardrail => {
            let in_scope = state
                .guardrail_result
                .as_ref()
                .map(|g| g.is_in_scope)
                .unwrap_or(true);
            if in_scope {
                Node::Router
            } else {
                Node::OutOfScope
            }
        }
        Node::Router => {
            let should_generate = state
                .router_decision
                .as_ref()
                .map(|d| d.should_generate)
                .unwrap_or(true);
            if should_generate || state.iteration >= ctx.options.max_iterations {
                Node::Generator
            } else {
                Node::Executor
            }
        }
        Node::Executor => {
            let retrieved = state
                .tool_history
                .last()
                .map(|t| t.tool_name == retrieve::NAME && t.success)
                .unwrap_or(false);
            if retrieved && !state.relevant_chunks.is_empty() {
                Node::Grader
            } else {
                Node::Router
            }
        }
        Node::Grader => {
            let enough = state.graded_relevant_count() >= ctx.options.top_k;
            let budget_left = state.retrieval_attempts < ctx.options.max_retrieval_attempts;
            if !enough && budget_left {
                Node::Rewriter
            } else {
                Node::Router
            }
        }
        Node::Rewriter => Node::Router,
        Node::Generator | Node::OutOfScope | Node::End => Node::End,
    }
}

/// Drive the state machine to a terminal state.
///
/// Consumes and returns the state; the caller (agent service) persists the
/// turn and emits the metadata tail.
pub async fn run(mut state: AgentState, ctx: &AgentContext, events: &EventSender) -> AgentState {
    let mut node = Node::Guardrail;

    while node != Node::End {
        debug!(?node, iteration = state.iteration, "engine step");

        let step = match node {
            Node::Guardrail => nodes::guardrail::run(&mut state, ctx, events).await,
            Node::Router => nodes::router::run(&mut state, ctx, events).await,
            Node::Executor => nodes::executor::run(&mut state, ctx, events).await,
            Node::Grader => nodes::grading::run(&mut state, ctx, events).await,
            Node::Rewriter => nodes::rewrite::run(&mut state, ctx, events).await,
            Node::Generator => nodes::generation::run(&mut state, ctx, events).await,
            Node::OutOfScope => nodes::out_of_scope::run(&mut state, ctx, events).await,
            Node::End => unreachable!("loop exits before End executes"),
        };

        if step.is_err() {
            warn!("event channel closed — cancelling run");
            state.status = AgentStatus::Failed;
            state.failure_reason = Some("cancelled".to_string());
            return state;
        }

        if state.status == AgentStatus::Failed {
            // Generator failure: the node already emitted the error event.
            return state;
        }

        let next = next_node(node, &state, ctx);
        if node == Node::Router && next == Node::Executor {
            // Counted before the transition is taken, so the cap is
            // observable in every state the executor sees.
            state.iteration += 1;
        }
        node = next;
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{
        AgentOptions, GuardrailScoring, RouterDecision, ScoredChunk, ToolExecution,
    };
    use crate::agent::tools::retrieve::RetrievedChunk;
    use crate::agent::tools::ToolRegistry;
    use crate::config::AgentDefaults;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::llm::LlmProvider;
    use std::sync::Arc;

    fn ctx() -> AgentContext {
        AgentContext {
            llm: LlmProvider::Dummy(DummyProvider::new()),
            tools: Arc::new(ToolRegistry::new()),
            options: AgentOptions::from_defaults(&AgentDefaults {
                guardrail_threshold: 75,
                top_k: 3,
                max_retrieval_attempts: 3,
                max_iterations: 10,
                conversation_window: 5,
                temperature: 0.3,
            }),
        }
    }

    fn state() -> AgentState {
        AgentState::new("q", Vec::new(), None)
    }

    fn graded_chunk(relevant: bool) -> ScoredChunk {
        ScoredChunk {
            chunk: RetrievedChunk {
                chunk_id: 1,
                arxiv_id: "a".to_string(),
                chunk_index: 0,
                title: "T".to_string(),
                authors: vec![],
                chunk_text: "t".to_string(),
                section_name: None,
                page_number: None,
                score: 1.0,
                published_date: None,
                pdf_url: None,
            },
            was_graded_relevant: Some(relevant),
        }
    }

    #[test]
    fn guardrail_routes_by_scope() {
        let ctx = ctx();
        let mut s = state();
        s.guardrail_result = Some(GuardrailScoring {
            score: 90,
            reasoning: String::new(),
            is_in_scope: true,
        });
        assert_eq!(next_node(Node::Guardrail, &s, &ctx), Node::Router);

        s.guardrail_result.as_mut().unwrap().is_in_scope = false;
        assert_eq!(next_node(Node::Guardrail, &s, &ctx), Node::OutOfScope);
    }

    #[test]
    fn router_forces_generation_at_iteration_cap() {
        let ctx = ctx();
        let mut s = state();
        s.router_decision = Some(RouterDecision {
            next_tool: Some("retrieve_chunks".to_string()),
            tool_args: None,
            rationale: String::new(),
            should_generate: false,
        });
        assert_eq!(next_node(Node::Router, &s, &ctx), Node::Executor);

        s.iteration = ctx.options.max_iterations;
        assert_eq!(next_node(Node::Router, &s, &ctx), Node::Generator);
    }

    #[test]
    fn router_generates_when_decided() {
        let ctx = ctx();
        let mut s = state();
        s.router_decision = Some(RouterDecision {
            next_tool: None,
            tool_args: None,
            rationale: String::new(),
            should_generate: true,
        });
        assert_eq!(next_node(Node::Router, &s, &ctx), Node::Generator);
    }

    #[test]
    fn executor_routes_to_grader_only_after_successful_retrieval() {
        let ctx = ctx();
        let mut s = state();
        s.tool_history.push(ToolExecution {
            tool_name: "web_search".to_string(),
            args: serde_json::json!({}),
            success: true,
            summary: String::new(),
            started_at: String::new(),
            ended_at: String::new(),
        });
        assert_eq!(next_node(Node::Executor, &s, &ctx), Node::Router);

        s.tool_history.push(ToolExecution {
            tool_name: "retrieve_chunks".to_string(),
            args: serde_json::json!({}),
            success: true,
            summary: String::new(),
            started_at: String::new(),
            ended_at: String::new(),
        });
        // Success but nothing retrieved — nothing to grade.
        assert_eq!(next_node(Node::Executor, &s, &ctx), Node::Router);

        s.relevant_chunks.push(graded_chunk(false));
        assert_eq!(next_node(Node::Executor, &s, &ctx), Node::Grader);
    }

    #[test]
    fn grader_rewrites_only_within_budget() {
        let ctx = ctx();
        let mut s = state();
        s.relevant_chunks.push(graded_chunk(false));
        s.retrieval_attempts = 1;
        assert_eq!(next_node(Node::Grader, &s, &ctx), Node::Rewriter);

        s.retrieval_attempts = ctx.options.max_retrieval_attempts;
        assert_eq!(next_node(Node::Grader, &s, &ctx), Node::Router);
    }

    #[test]
    fn grader_proceeds_when_enough_relevant() {
        let ctx = ctx();
        let mut s = state();
        for _ in 0..3 {
            s.relevant_chunks.push(graded_chunk(true));
        }
        s.retrieval_attempts = 1;
        assert_eq!(next_node(Node::Grader, &s, &ctx), Node::Router);
    }

    #[test]
    fn terminal_nodes_end() {
        let ctx = ctx();
        let s = state();
        assert_eq!(next_node(Node::Generator, &s, &ctx), Node::End);
        assert_eq!(next_node(Node::OutOfScope, &s, &ctx), Node::End);
        assert_eq!(next_node(Node::Rewriter, &s, &ctx), Node::Router);
    }
}
