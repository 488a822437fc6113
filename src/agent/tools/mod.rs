//! Name-addressable agent tools.
//!
//! [`Tool`] is an enum over concrete tool implementations — the same
//! dispatch style as the LLM provider layer. Every tool declares a
//! JSON-schema parameter description used both for router prompting and for
//! argument validation in the executor. Tools never return `Err`; failures
//! are encoded in [`ToolResult`] so the state machine always gets a record
//! to append to `tool_history`.

pub mod list_papers;
pub mod retrieve;
pub mod summarize_paper;
pub mod web_search;

use std::collections::BTreeMap;

use crate::error::AppError;

use list_papers::ListPapersTool;
use retrieve::RetrieveChunksTool;
use summarize_paper::SummarizePaperTool;
use web_search::WebSearchTool;

// ── Result envelope ───────────────────────────────────────────────────────────

/// Outcome of one tool invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_name: String,
}

impl ToolResult {
    pub fn ok(tool_name: &str, data: serde_json::Value) -> Self {
        Self { success: true, data: Some(data), error: None, tool_name: tool_name.to_string() }
    }

    pub fn fail(tool_name: &str, error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()), tool_name: tool_name.to_string() }
    }
}

// ── Tool enum ─────────────────────────────────────────────────────────────────

/// All available tools. Adding one = new module + new variant + match arms.
#[derive(Debug, Clone)]
pub enum Tool {
    RetrieveChunks(RetrieveChunksTool),
    WebSearch(WebSearchTool),
    ListPapers(ListPapersTool),
    SummarizePaper(SummarizePaperTool),
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::RetrieveChunks(_) => retrieve::NAME,
            Tool::WebSearch(_) => web_search::NAME,
            Tool::ListPapers(_) => list_papers::NAME,
            Tool::SummarizePaper(_) => summarize_paper::NAME,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::RetrieveChunks(_) => retrieve::DESCRIPTION,
            Tool::WebSearch(_) => web_search::DESCRIPTION,
            Tool::ListPapers(_) => list_papers::DESCRIPTION,
            Tool::SummarizePaper(_) => summarize_paper::DESCRIPTION,
        }
    }

    /// JSON-schema description of the accepted arguments.
    pub fn parameters_schema(&self) -> serde_json::Value {
        match self {
            Tool::RetrieveChunks(t) => t.parameters_schema(),
            Tool::WebSearch(t) => t.parameters_schema(),
            Tool::ListPapers(t) => t.parameters_schema(),
            Tool::SummarizePaper(t) => t.parameters_schema(),
        }
    }

    /// Run the tool. Invalid arguments and transport failures come back as
    /// `success = false`, never as `Err`.
    pub async fn execute(&self, args: &serde_json::Value) -> ToolResult {
        if let Err(reason) = validate_args(&self.parameters_schema(), args) {
            return ToolResult::fail(self.name(), format!("invalid arguments: {reason}"));
        }
        match self {
            Tool::RetrieveChunks(t) => t.execute(args).await,
            Tool::WebSearch(t) => t.execute(args).await,
            Tool::ListPapers(t) => t.execute(args).await,
            Tool::SummarizePaper(t) => t.execute(args).await,
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Process-wide tool registry. Populated before engine construction,
/// read-only afterwards. Iteration order is the sorted tool name order, so
/// router prompts are stable.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are a configuration error.
    pub fn register(&mut self, tool: Tool) -> Result<(), AppError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AppError::Agent(format!("tool '{name}' is already registered")));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute by name; unknown names fail like any other tool error.
    pub async fn execute(&self, name: &str, args: &serde_json::Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => ToolResult::fail(name, format!("tool '{name}' not found")),
        }
    }

    /// Schema listing for the router prompt.
    pub fn schemas(&self) -> serde_json::Value {
        let list: Vec<serde_json::Value> = self
            .tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters_schema(),
                })
            })
            .collect();
        serde_json::Value::Array(list)
    }
}

// ── Argument validation ───────────────────────────────────────────────────────

/// Validate `args` against a JSON-schema-like object description.
///
/// Checks the shape the built-in tools actually declare: required keys,
/// `string`/`integer` types, and `maximum`/`minimum` bounds on integers.
fn validate_args(schema: &serde_json::Value, args: &serde_json::Value) -> Result<(), String> {
    let Some(args_obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    let empty = serde_json::Map::new();
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args_obj.contains_key(key) {
                return Err(format!("missing required argument '{key}'"));
            }
        }
    }

    for (key, value) in args_obj {
        let Some(spec) = properties.get(key) else {
            return Err(format!("unknown argument '{key}'"));
        };
        match spec.get("type").and_then(|t| t.as_str()) {
            Some("string") => {
                if !value.is_string() {
                    return Err(format!("argument '{key}' must be a string"));
                }
            }
            Some("integer") => {
                let Some(n) = value.as_i64() else {
                    return Err(format!("argument '{key}' must be an integer"));
                };
                if let Some(max) = spec.get("maximum").and_then(|m| m.as_i64()) {
                    if n > max {
                        return Err(format!("argument '{key}' must be <= {max}"));
                    }
                }
                if let Some(min) = spec.get("minimum").and_then(|m| m.as_i64()) {
                    if n < min {
                        return Err(format!("argument '{key}' must be >= {min}"));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embeddings::HashedEmbeddings;
    use crate::search::{EmbeddingsClient, HybridSearch, PaperStore};
    use tempfile::TempDir;

    fn make_search(tmp: &TempDir) -> HybridSearch {
        let store = PaperStore::open(&tmp.path().join("papers.db"), 16).expect("open");
        HybridSearch::new(store, EmbeddingsClient::Hashed(HashedEmbeddings::new(16)))
    }

    #[test]
    fn registry_rejects_duplicates() {
        let tmp = TempDir::new().expect("tempdir");
        let search = make_search(&tmp);
        let mut registry = ToolRegistry::new();
        registry
            .register(Tool::RetrieveChunks(RetrieveChunksTool::new(search.clone(), 6)))
            .expect("first registration");
        let err = registry
            .register(Tool::RetrieveChunks(RetrieveChunksTool::new(search, 6)))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn schemas_are_sorted_by_name() {
        let tmp = TempDir::new().expect("tempdir");
        let search = make_search(&tmp);
        let mut registry = ToolRegistry::new();
        registry
            .register(Tool::WebSearch(WebSearchTool::with_defaults()))
            .expect("register web_search");
        registry
            .register(Tool::ListPapers(ListPapersTool::new(search.clone())))
            .expect("register list_papers");
        registry
            .register(Tool::RetrieveChunks(RetrieveChunksTool::new(search, 6)))
            .expect("register retrieve_chunks");

        let schemas = registry.schemas();
        let names: Vec<&str> = schemas
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["list_papers", "retrieve_chunks", "web_search"]);
    }

    #[tokio::test]
    async fn unknown_tool_fails_cleanly() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nonesuch", &serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[test]
    fn validate_args_required_and_types() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "top_k": { "type": "integer", "maximum": 10, "minimum": 1 }
            },
            "required": ["query"]
        });
        assert!(validate_args(&schema, &serde_json::json!({"query": "q"})).is_ok());
        assert!(validate_args(&schema, &serde_json::json!({})).is_err());
        assert!(validate_args(&schema, &serde_json::json!({"query": 3})).is_err());
        assert!(validate_args(&schema, &serde_json::json!({"query": "q", "top_k": 99})).is_err());
        assert!(validate_args(&schema, &serde_json::json!({"query": "q", "extra": 1})).is_err());
    }
}
