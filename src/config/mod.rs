//! Service configuration.
//!
//! TOML files with `[meta] base = "..."` inheritance, deep-merged, then
//! resolved into the public [`Config`] struct. Env overrides:
//! `PAPERBOT_WORK_DIR`, `PAPERBOT_LOG_LEVEL`. API keys (`LLM_API_KEY`,
//! `EMBEDDINGS_API_KEY`) come from the environment only, never from TOML.

mod load;
mod raw;
mod types;

pub use load::{load, load_from};
pub use types::{
    AgentDefaults, Config, EmbeddingsConfig, LlmConfig, OpenAiConfig, ServiceConfig, ZaiConfig,
};
