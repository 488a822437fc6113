//! `web_search` — DuckDuckGo instant-answer lookup for recent information.

use serde::Deserialize;
use tracing::{debug, warn};

use super::ToolResult;

pub const NAME: &str = "web_search";
pub const DESCRIPTION: &str = "Search the web for recent information, news, or updates. \
Use this when the user asks about recent developments, new papers, \
or information that may not be in the local database.";

const DEFAULT_API_URL: &str = "https://api.duckduckgo.com/";
const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_CAP: i64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
    max_results: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: reqwest::Client,
    api_url: String,
    default_max_results: usize,
}

impl WebSearchTool {
    pub fn new(api_url: impl Into<String>, default_max_results: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, api_url: api_url.into(), default_max_results }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_API_URL, DEFAULT_MAX_RESULTS)
    }

    pub fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query for finding web results"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "minimum": 1,
                    "maximum": MAX_RESULTS_CAP,
                    "default": self.default_max_results
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
        let max_results = args
            .max_results
            .unwrap_or(self.default_max_results as i64)
            .clamp(1, MAX_RESULTS_CAP) as usize;

        debug!(query = %args.query, max_results, "web_search executing");

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("q", args.query.as_str()),
                ("format", "json"),
                ("no_redirect", "1"),
                ("no_html", "1"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(query = %args.query, "web_search timeout");
                return ToolResult::fail(NAME, "Search request timed out");
            }
            Err(e) => return ToolResult::fail(NAME, format!("Search request failed: {e}")),
        };

        if !response.status().is_success() {
            return ToolResult::fail(
                NAME,
                format!("Search request failed: HTTP {}", response.status()),
            );
        }

        let body: DuckDuckGoResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => return ToolResult::fail(NAME, format!("Search response parse failed: {e}")),
        };

        let mut results = Vec::new();

        // Abstract (main answer) first, then related topics.
        if !body.abstract_text.is_empty() {
            results.push(serde_json::json!({
                "title": if body.heading.is_empty() { "Answer".to_string() } else { body.heading.clone() },
                "snippet": body.abstract_text,
                "url": body.abstract_url,
            }));
        }
        for topic in body.related_topics {
            if results.len() >= max_results {
                break;
            }
            if let Some(text) = topic.text.filter(|t| !t.is_empty()) {
                let title: String = text.chars().take(100).collect();
                results.push(serde_json::json!({
                    "title": title,
                    "snippet": text,
                    "url": topic.first_url.unwrap_or_default(),
                }));
            }
        }
        results.truncate(max_results);

        debug!(results_found = results.len(), "web_search completed");
        ToolResult::ok(NAME, serde_json::json!({ "results": results }))
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DuckDuckGoResponse {
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "Abstract", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text", default)]
    text: Option<String>,
    #[serde(rename = "FirstURL", default)]
    first_url: Option<String>,
}
