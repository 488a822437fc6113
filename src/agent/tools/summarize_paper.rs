//! `summarize_paper` — LLM-generated overview of one indexed paper.

use serde::Deserialize;
use tracing::debug;

use crate::llm::{ChatMessage, LlmProvider};
use crate::search::store::PaperStore;

use super::ToolResult;

pub const NAME: &str = "summarize_paper";
pub const DESCRIPTION: &str = "Generate a concise 2-3 sentence summary of a paper's abstract. \
Use when the user wants a quick overview of what a paper is about. \
Only works for papers in the knowledge base.";

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 200;

fn summary_prompt(title: &str, abstract_text: &str) -> String {
    format!(
        "Summarize this research paper abstract in 2-3 sentences. Focus on:
- The main problem or question addressed
- The key approach or method
- The primary findings or contributions

Title: {title}
Abstract: {abstract_text}

Provide only the summary, no preamble."
    )
}

#[derive(Debug, Deserialize)]
struct Args {
    arxiv_id: String,
}

/// Summaries go through the process-default provider; per-request provider
/// overrides apply to the agent's own reasoning, not to tool internals.
#[derive(Debug, Clone)]
pub struct SummarizePaperTool {
    store: PaperStore,
    llm: LlmProvider,
}

impl SummarizePaperTool {
    pub fn new(store: PaperStore, llm: LlmProvider) -> Self {
        Self { store, llm }
    }

    pub fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "arxiv_id": {
                    "type": "string",
                    "description": "arXiv ID of the paper to summarize (e.g., '2301.00001')"
                }
            },
            "required": ["arxiv_id"]
        })
    }

    pub async fn execute(&self, args: &serde_json::Value) -> ToolResult {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::fail(NAME, format!("invalid arguments: {e}")),
        };

        debug!(arxiv_id = %args.arxiv_id, "summarize_paper executing");

        let paper = match self.store.get_paper(&args.arxiv_id) {
            Ok(Some(p)) => p,
            Ok(None) => {
                return ToolResult::fail(
                    NAME,
                    format!("Paper {} not found in knowledge base", args.arxiv_id),
                )
            }
            Err(e) => return ToolResult::fail(NAME, e.to_string()),
        };

        let prompt = summary_prompt(&paper.title, &paper.abstract_text);
        let messages = [ChatMessage::user(prompt)];
        match self
            .llm
            .complete(&messages, SUMMARY_TEMPERATURE, Some(SUMMARY_MAX_TOKENS))
            .await
        {
            Ok(response) => {
                debug!(arxiv_id = %args.arxiv_id, "summarize_paper completed");
                ToolResult::ok(
                    NAME,
                    serde_json::json!({
                        "arxiv_id": paper.arxiv_id,
                        "title": paper.title,
                        "summary": response.text,
                    }),
                )
            }
            Err(e) => ToolResult::fail(NAME, e.to_string()),
        }
    }
}
