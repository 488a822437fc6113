//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape — serde target before resolution.
#[derive(Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub service: RawService,
    #[serde(default)]
    pub llm: RawLlm,
    #[serde(default)]
    pub embeddings: RawEmbeddings,
    #[serde(default)]
    pub agent: RawAgent,
}

#[derive(Deserialize)]
pub(super) struct RawService {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for RawService {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            bind: default_bind(),
        }
    }
}

// ── LLM ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub openai: RawOpenAi,
    #[serde(default)]
    pub zai: RawZai,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: RawOpenAi::default(),
            zai: RawZai::default(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawZai {
    #[serde(default = "default_zai_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_zai_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawZai {
    fn default() -> Self {
        Self {
            api_base_url: default_zai_api_base_url(),
            model: default_zai_model(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

// ── Embeddings ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawEmbeddings {
    #[serde(default = "default_embeddings_provider")]
    pub provider: String,
    #[serde(default = "default_embeddings_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_embeddings_model")]
    pub model: String,
    #[serde(default = "default_embeddings_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embeddings_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawEmbeddings {
    fn default() -> Self {
        Self {
            provider: default_embeddings_provider(),
            api_base_url: default_embeddings_api_base_url(),
            model: default_embeddings_model(),
            dimension: default_embeddings_dimension(),
            timeout_seconds: default_embeddings_timeout_seconds(),
        }
    }
}

// ── Agent ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawAgent {
    #[serde(default = "default_guardrail_threshold")]
    pub guardrail_threshold: u8,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_retrieval_attempts")]
    pub max_retrieval_attempts: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_conversation_window")]
    pub conversation_window: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self {
            guardrail_threshold: default_guardrail_threshold(),
            top_k: default_top_k(),
            max_retrieval_attempts: default_max_retrieval_attempts(),
            max_iterations: default_max_iterations(),
            conversation_window: default_conversation_window(),
            temperature: default_temperature(),
        }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_service_name() -> String {
    "paperbot".to_string()
}

fn default_work_dir() -> String {
    "~/.paperbot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_openai_api_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_zai_api_base_url() -> String {
    "https://api.z.ai/api/paas/v4/chat/completions".to_string()
}

fn default_zai_model() -> String {
    "glm-4.5-air".to_string()
}

fn default_llm_timeout_seconds() -> u64 {
    60
}

fn default_embeddings_provider() -> String {
    "hashed".to_string()
}

fn default_embeddings_api_base_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}

fn default_embeddings_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embeddings_dimension() -> usize {
    256
}

fn default_embeddings_timeout_seconds() -> u64 {
    30
}

fn default_guardrail_threshold() -> u8 {
    75
}

fn default_top_k() -> usize {
    3
}

fn default_max_retrieval_attempts() -> u32 {
    3
}

fn default_max_iterations() -> u32 {
    10
}

fn default_conversation_window() -> usize {
    5
}

fn default_temperature() -> f32 {
    0.3
}
