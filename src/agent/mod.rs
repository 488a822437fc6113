//! The agent execution core: state machine, nodes, tools, events, service.

pub mod engine;
pub mod events;
pub mod nodes;
pub mod prompts;
pub mod service;
pub mod state;
pub mod tools;

use std::sync::Arc;

use crate::llm::LlmProvider;

use state::AgentOptions;
use tools::ToolRegistry;

/// Shared capabilities handed to every node.
///
/// Built once per request; the registry is the process-wide one, the
/// provider is selected per request, the options merge config defaults with
/// request overrides.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub llm: LlmProvider,
    pub tools: Arc<ToolRegistry>,
    pub options: AgentOptions,
}
