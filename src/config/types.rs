//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs that subsystems consume.
//! Raw TOML deserialization types live in `raw.rs`.

use std::path::PathBuf;

// ── Service ──────────────────────────────────────────────────────────────────

/// Process-level service settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name used in log spans.
    pub name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Socket address the HTTP listener binds to.
    pub bind: String,
}

// ── LLM ──────────────────────────────────────────────────────────────────────

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Z.AI provider configuration (`[llm.zai]`).
/// The wire protocol is OpenAI-compatible; only endpoint and model differ.
#[derive(Debug, Clone)]
pub struct ZaiConfig {
    pub api_base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider handles requests that name none (`"openai"`, `"zai"`, `"dummy"`).
    pub default_provider: String,
    pub openai: OpenAiConfig,
    pub zai: ZaiConfig,
}

// ── Embeddings ───────────────────────────────────────────────────────────────

/// Embeddings client configuration (`[embeddings]`).
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    /// `"remote"` for the HTTP API, `"hashed"` for the deterministic local embedder.
    pub provider: String,
    pub api_base_url: String,
    pub model: String,
    /// Vector dimension; chunk embeddings in the store must match.
    pub dimension: usize,
    pub timeout_seconds: u64,
}

// ── Agent ────────────────────────────────────────────────────────────────────

/// Per-request agent defaults (`[agent]`), overridable per request within the
/// documented ranges.
#[derive(Debug, Clone)]
pub struct AgentDefaults {
    /// Minimum in-scope score, 0..=100.
    pub guardrail_threshold: u8,
    /// Chunks surfaced to the generator, 1..=10.
    pub top_k: usize,
    /// Retrieval budget, 1..=5.
    pub max_retrieval_attempts: u32,
    /// Hard cap on router cycles.
    pub max_iterations: u32,
    /// Most recent turns loaded as history, 1..=10.
    pub conversation_window: usize,
    /// Generation temperature.
    pub temperature: f32,
}

// ── Config (root) ────────────────────────────────────────────────────────────

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub agent: AgentDefaults,
    /// API key from `LLM_API_KEY` env var — never sourced from TOML.
    pub llm_api_key: Option<String>,
    /// API key from `EMBEDDINGS_API_KEY` env var — never sourced from TOML.
    pub embeddings_api_key: Option<String>,
}

impl Config {
    /// Path of the SQLite file holding papers and chunks.
    pub fn papers_db_path(&self) -> PathBuf {
        self.service.work_dir.join("papers.db")
    }

    /// Path of the SQLite file holding conversations and turns.
    pub fn conversations_db_path(&self) -> PathBuf {
        self.service.work_dir.join("conversations.db")
    }
}
