//! Graph nodes.
//!
//! Every node is an async transformation of [`AgentState`](super::state::AgentState)
//! that emits lifecycle events. LLM failures are handled locally with the
//! documented fallbacks — a node returns `Err` only when the event channel
//! was cancelled.

pub mod executor;
pub mod generation;
pub mod grading;
pub mod guardrail;
pub mod out_of_scope;
pub mod rewrite;
pub mod router;
