//! Executor node — runs the tool the router selected and merges its output.

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

use super::super::events::{Cancelled, EventSender};
use super::super::state::{AgentState, ScoredChunk, ToolExecution};
use super::super::tools::retrieve::{self, RetrievedChunk};
use super::super::tools::ToolResult;
use super::super::AgentContext;

pub async fn run(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &EventSender,
) -> Result<(), Cancelled> {
    let Some(decision) = state.router_decision.clone() else {
        warn!("executor entered without a router decision");
        return Ok(());
    };
    let Some(tool_name) = decision.next_tool else {
        warn!("executor entered without a selected tool");
        return Ok(());
    };
    let args = decision.tool_args.unwrap_or(serde_json::json!({}));

    events
        .status(
            "executing",
            format!("Running {tool_name}"),
            Some(serde_json::json!({ "tool_name": tool_name })),
        )
        .await?;

    let started_at = now_iso8601();
    let result = ctx.tools.execute(&tool_name, &args).await;
    let ended_at = now_iso8601();

    info!(tool = %tool_name, success = result.success, "tool executed");

    let summary = summarize_result(&result);
    state.tool_history.push(ToolExecution {
        tool_name: tool_name.clone(),
        args,
        success: result.success,
        summary: summary.clone(),
        started_at,
        ended_at,
    });

    if !result.success {
        state.reasoning_steps.push(format!(
            "Tool {tool_name} failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ));
    }

    if tool_name == retrieve::NAME && result.success {
        merge_retrieved(state, &result);
        state.retrieval_attempts += 1;
        state
            .reasoning_steps
            .push(format!("Retrieved documents (attempt {})", state.retrieval_attempts));
    }

    events
        .status(
            "executing",
            format!("{tool_name} finished"),
            Some(serde_json::json!({ "tool_name": tool_name, "success": result.success })),
        )
        .await?;

    Ok(())
}

/// Union newly retrieved chunks into the evidence set.
///
/// Keyed by `(arxiv_id, chunk_index)`; the maximum score wins and an
/// existing grading mark survives re-retrieval. Order is score descending
/// with a stable id tie-break.
fn merge_retrieved(state: &mut AgentState, result: &ToolResult) {
    let chunks: Vec<RetrievedChunk> = result
        .data
        .as_ref()
        .and_then(|d| d.get("chunks"))
        .and_then(|c| serde_json::from_value(c.clone()).ok())
        .unwrap_or_default();

    for incoming in chunks {
        let key = (incoming.arxiv_id.clone(), incoming.chunk_index);
        match state
            .relevant_chunks
            .iter_mut()
            .find(|c| (c.chunk.arxiv_id.clone(), c.chunk.chunk_index) == key)
        {
            Some(existing) => {
                if incoming.score > existing.chunk.score {
                    existing.chunk.score = incoming.score;
                }
            }
            None => state.relevant_chunks.push(ScoredChunk {
                chunk: incoming,
                was_graded_relevant: None,
            }),
        }
    }

    state.relevant_chunks.sort_by(|a, b| {
        b.chunk
            .score
            .partial_cmp(&a.chunk.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.arxiv_id.cmp(&b.chunk.arxiv_id))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

/// Brief summary recorded in `tool_history` and shown to the router.
fn summarize_result(result: &ToolResult) -> String {
    if let Some(error) = &result.error {
        return format!("Error: {error}");
    }
    let Some(data) = &result.data else {
        return String::new();
    };
    if let Some(count) = data.get("count").and_then(|c| c.as_u64()) {
        return format!("Retrieved {count} chunks");
    }
    if let Some(results) = data.get("results").and_then(|r| r.as_array()) {
        return format!("Found {} results", results.len());
    }
    if let Some(total) = data.get("total").and_then(|t| t.as_u64()) {
        return format!("Found {total} items");
    }
    let rendered = data.to_string();
    rendered.chars().take(100).collect()
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(arxiv_id: &str, index: u32, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: 1,
            arxiv_id: arxiv_id.to_string(),
            chunk_index: index,
            title: "T".to_string(),
            authors: vec![],
            chunk_text: "text".to_string(),
            section_name: None,
            page_number: None,
            score,
            published_date: None,
            pdf_url: None,
        }
    }

    fn result_with(chunks: Vec<RetrievedChunk>) -> ToolResult {
        let count = chunks.len();
        ToolResult::ok(retrieve::NAME, serde_json::json!({ "chunks": chunks, "count": count }))
    }

    #[test]
    fn merge_unions_by_key_keeping_max_score() {
        let mut state = AgentState::new("q", Vec::new(), None);
        merge_retrieved(&mut state, &result_with(vec![chunk("a", 0, 0.5)]));
        merge_retrieved(&mut state, &result_with(vec![chunk("a", 0, 0.9), chunk("b", 1, 0.4)]));

        assert_eq!(state.relevant_chunks.len(), 2);
        assert_eq!(state.relevant_chunks[0].chunk.arxiv_id, "a");
        assert!((state.relevant_chunks[0].chunk.score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn merge_keeps_grading_mark() {
        let mut state = AgentState::new("q", Vec::new(), None);
        merge_retrieved(&mut state, &result_with(vec![chunk("a", 0, 0.5)]));
        state.relevant_chunks[0].was_graded_relevant = Some(true);
        merge_retrieved(&mut state, &result_with(vec![chunk("a", 0, 0.8)]));
        assert_eq!(state.relevant_chunks[0].was_graded_relevant, Some(true));
    }

    #[test]
    fn merge_orders_by_score_descending() {
        let mut state = AgentState::new("q", Vec::new(), None);
        merge_retrieved(
            &mut state,
            &result_with(vec![chunk("low", 0, 0.1), chunk("high", 0, 1.0), chunk("mid", 0, 0.5)]),
        );
        let order: Vec<&str> = state
            .relevant_chunks
            .iter()
            .map(|c| c.chunk.arxiv_id.as_str())
            .collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn summaries_cover_tool_shapes() {
        assert_eq!(
            summarize_result(&result_with(vec![chunk("a", 0, 1.0)])),
            "Retrieved 1 chunks"
        );
        assert_eq!(
            summarize_result(&ToolResult::ok("web_search", serde_json::json!({ "results": [1, 2] }))),
            "Found 2 results"
        );
        assert_eq!(
            summarize_result(&ToolResult::fail("web_search", "timeout")),
            "Error: timeout"
        );
    }
}
