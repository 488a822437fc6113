//! `list_papers` — introspection over the indexed corpus.

use serde::Deserialize;
use tracing::debug;

use crate::search::store::PaperFilters;
use crate::search::HybridSearch;

use super::ToolResult;

pub const NAME: &str = "list_papers";
pub const DESCRIPTION: &str = "List papers currently indexed in the research database, \
with titles, authors, and categories. Use this when the user asks what papers \
are available or wants an overview of the corpus.";

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
struct Args {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ListPapersTool {
    search: HybridSearch,
}

impl ListPapersTool {
    pub fn new(search: HybridSearch) -> Self {
        Self { search }
    }

    pub fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of papers to return",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "default": DEFAULT_LIMIT
                },
                "offset": {
                    "type": "integer",
                    "description": "Number of papers to skip",
                    "minimum": 0
                }
            },
            "required": []
        })
    }

    pub async fn execute(&self, args: &serde_json::Value) -> ToolResult {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::fail(NAME, format!("invalid arguments: {e}")),
        };
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT as i64).clamp(1, MAX_LIMIT) as usize;
        let offset = args.offset.unwrap_or(0).max(0) as usize;

        debug!(limit, offset, "list_papers executing");

        match self.search.list_papers(&PaperFilters::default(), limit, offset) {
            Ok((papers, total)) => {
                ToolResult::ok(NAME, serde_json::json!({ "papers": papers, "total": total }))
            }
            Err(e) => ToolResult::fail(NAME, e.to_string()),
        }
    }
}
