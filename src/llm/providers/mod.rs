//! Concrete LLM provider backends.

pub mod dummy;
pub mod openai_compatible;
pub mod zai;

use crate::config::LlmConfig;

use super::{LlmProvider, ProviderError};

/// Build a provider from config, honouring per-request overrides.
///
/// `requested` selects the provider tag for this request (falls back to
/// `config.default_provider`); `model_override` replaces the configured model
/// for that provider. `api_key` comes from `LLM_API_KEY` env — never TOML.
pub fn build(
    config: &LlmConfig,
    requested: Option<&str>,
    model_override: Option<&str>,
    api_key: Option<String>,
) -> Result<LlmProvider, ProviderError> {
    let tag = requested.unwrap_or(&config.default_provider);
    match tag {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::new())),
        "openai" => {
            let model = model_override.unwrap_or(&config.openai.model).to_string();
            let provider = openai_compatible::OpenAiCompatibleProvider::new(
                config.openai.api_base_url.clone(),
                model,
                config.openai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(provider))
        }
        "zai" => {
            let model = model_override.unwrap_or(&config.zai.model).to_string();
            let provider = zai::ZaiProvider::new(
                config.zai.api_base_url.clone(),
                model,
                config.zai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::Zai(provider))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
