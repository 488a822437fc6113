//! `retrieve_chunks` — hybrid search over the paper database.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::search::store::PaperFilters;
use crate::search::HybridSearch;

use super::ToolResult;

pub const NAME: &str = "retrieve_chunks";
pub const DESCRIPTION: &str = "Search the AI/ML research paper database for relevant document chunks. \
Use this when you need information from academic papers about machine learning, \
deep learning, transformers, neural networks, or related AI topics.";

/// Hard cap on chunks a single call may return.
const MAX_TOP_K: i64 = 10;

/// One chunk as returned to the router/executor and carried through grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: i64,
    pub arxiv_id: String,
    pub chunk_index: u32,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub chunk_text: String,
    #[serde(default)]
    pub section_name: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    pub score: f64,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
    top_k: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RetrieveChunksTool {
    search: HybridSearch,
    default_top_k: usize,
}

impl RetrieveChunksTool {
    pub fn new(search: HybridSearch, default_top_k: usize) -> Self {
        Self { search, default_top_k }
    }

    pub fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query for finding relevant research paper chunks"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of chunks to retrieve",
                    "minimum": 1,
                    "maximum": MAX_TOP_K,
                    "default": self.default_top_k
                }
            },
            "required": ["query"]
        })
    }

    pub async fn execute(&self, args: &serde_json::Value) -> ToolResult {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::fail(NAME, format!("invalid arguments: {e}")),
        };
        let top_k = args.top_k.unwrap_or(self.default_top_k as i64).clamp(1, MAX_TOP_K) as usize;

        debug!(query = %args.query, top_k, "retrieve_chunks executing");

        match self.search.search(&args.query, top_k, &PaperFilters::default()).await {
            Ok(hits) => {
                let chunks: Vec<RetrievedChunk> = hits
                    .into_iter()
                    .map(|h| RetrievedChunk {
                        chunk_id: h.chunk_id,
                        arxiv_id: h.arxiv_id,
                        chunk_index: h.chunk_index,
                        title: h.title,
                        authors: h.authors,
                        chunk_text: h.chunk_text,
                        section_name: h.section_name,
                        page_number: h.page_number,
                        score: h.score,
                        published_date: h.published_date,
                        pdf_url: h.pdf_url,
                    })
                    .collect();
                debug!(chunks_found = chunks.len(), "retrieve_chunks completed");
                let count = chunks.len();
                ToolResult::ok(NAME, serde_json::json!({ "chunks": chunks, "count": count }))
            }
            Err(e) => ToolResult::fail(NAME, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embeddings::HashedEmbeddings;
    use crate::search::store::{NewChunk, PaperRecord};
    use crate::search::{EmbeddingsClient, PaperStore};
    use tempfile::TempDir;

    const DIM: usize = 32;

    fn make_tool(tmp: &TempDir) -> RetrieveChunksTool {
        let store = PaperStore::open(&tmp.path().join("papers.db"), DIM).expect("open");
        let search = HybridSearch::new(store, EmbeddingsClient::Hashed(HashedEmbeddings::new(DIM)));
        RetrieveChunksTool::new(search, 6)
    }

    fn seed(tool: &RetrieveChunksTool, arxiv_id: &str, text: &str) {
        let paper = PaperRecord {
            arxiv_id: arxiv_id.to_string(),
            title: "T".to_string(),
            authors: vec![],
            abstract_text: String::new(),
            categories: vec![],
            published_date: None,
            pdf_url: None,
            raw_text: String::new(),
            sections: vec![],
        };
        tool.search.store().upsert_paper(&paper).expect("upsert");
        tool.search
            .store()
            .insert_chunks(
                arxiv_id,
                &[NewChunk {
                    chunk_index: 0,
                    chunk_text: text.to_string(),
                    section_name: None,
                    page_number: None,
                    embedding: HashedEmbeddings::new(DIM).embed_one(text),
                }],
            )
            .expect("index");
    }

    #[tokio::test]
    async fn returns_chunks_and_count() {
        let tmp = TempDir::new().expect("tempdir");
        let tool = make_tool(&tmp);
        seed(&tool, "1706.03762", "attention mechanism in transformers");

        let result = tool.execute(&serde_json::json!({ "query": "attention" })).await;
        assert!(result.success);
        let data = result.data.expect("data");
        assert_eq!(data["count"], 1);
        let chunks: Vec<RetrievedChunk> =
            serde_json::from_value(data["chunks"].clone()).expect("parse chunks");
        assert_eq!(chunks[0].arxiv_id, "1706.03762");
    }

    #[tokio::test]
    async fn top_k_is_clamped() {
        let tmp = TempDir::new().expect("tempdir");
        let tool = make_tool(&tmp);
        seed(&tool, "x.1", "words");
        // 500 exceeds the tool cap; clamped to 10 rather than erroring.
        let result = tool
            .execute(&serde_json::json!({ "query": "words", "top_k": 500 }))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn missing_query_fails() {
        let tmp = TempDir::new().expect("tempdir");
        let tool = make_tool(&tmp);
        let result = tool.execute(&serde_json::json!({})).await;
        assert!(!result.success);
    }
}
