//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities — clone them freely.
//! Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
//!
//! Three operations cover everything the agent needs:
//! - [`complete`](LlmProvider::complete) — one-shot text completion.
//! - [`complete_structured`](LlmProvider::complete_structured) — completion
//!   parsed as a single JSON object, with one retry on parse failure.
//! - [`stream_tokens`](LlmProvider::stream_tokens) — token-by-token stream.

pub mod providers;

use thiserror::Error;
use tokio::sync::mpsc;

use providers::dummy::DummyProvider;
use providers::openai_compatible::OpenAiCompatibleProvider;
use providers::zai::ZaiProvider;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("structured output parse failed: {0}")]
    Parse(String),
    #[error("stream failed: {0}")]
    Stream(String),
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// One chat message in provider wire order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Completion response: text plus token accounting when the backend reports it.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Receiver half of a token stream. Each item is one generated token; the
/// stream ends when the sender is dropped.
pub type TokenStream = mpsc::Receiver<Result<String, ProviderError>>;

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Adding a backend = new module + new variant + new match arms.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(DummyProvider),
    OpenAiCompatible(OpenAiCompatibleProvider),
    Zai(ZaiProvider),
}

impl LlmProvider {
    /// Provider tag used in request routing and turn metadata.
    pub fn name(&self) -> &str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
            LlmProvider::Zai(_) => "zai",
        }
    }

    /// Model identifier recorded in turn metadata.
    pub fn model(&self) -> &str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(p) => p.model(),
            LlmProvider::Zai(p) => p.model(),
        }
    }

    /// One-shot completion.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(messages).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(messages, temperature, max_tokens).await,
            LlmProvider::Zai(p) => p.complete(messages, temperature, max_tokens).await,
        }
    }

    /// Completion constrained to a single JSON object.
    ///
    /// The first attempt requests JSON-mode output where the backend supports
    /// it. On a parse failure the request is retried once with an explicit
    /// JSON-only reminder appended; a second failure is returned to the
    /// caller, which applies its node-level fallback.
    pub async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<serde_json::Value, ProviderError> {
        let text = match self {
            LlmProvider::Dummy(p) => p.complete(messages).await?.text,
            LlmProvider::OpenAiCompatible(p) => {
                p.complete_json(messages, temperature, max_tokens).await?.text
            }
            LlmProvider::Zai(p) => p.complete_json(messages, temperature, max_tokens).await?.text,
        };

        match parse_json_object(&text) {
            Ok(value) => Ok(value),
            Err(first_err) => {
                tracing::warn!(error = %first_err, "structured output parse failed — retrying once");
                let mut retry = messages.to_vec();
                retry.push(ChatMessage::user(
                    "Respond with a single valid JSON object and nothing else.",
                ));
                let text = match self {
                    LlmProvider::Dummy(p) => p.complete(&retry).await?.text,
                    LlmProvider::OpenAiCompatible(p) => {
                        p.complete_json(&retry, temperature, max_tokens).await?.text
                    }
                    LlmProvider::Zai(p) => {
                        p.complete_json(&retry, temperature, max_tokens).await?.text
                    }
                };
                parse_json_object(&text)
            }
        }
    }

    /// Token-by-token streaming completion.
    pub async fn stream_tokens(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<TokenStream, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.stream_tokens(messages).await,
            LlmProvider::OpenAiCompatible(p) => p.stream_tokens(messages, temperature, max_tokens).await,
            LlmProvider::Zai(p) => p.stream_tokens(messages, temperature, max_tokens).await,
        }
    }
}

/// Extract a JSON object from completion text.
///
/// Tolerates markdown fences and prose around the object by slicing from the
/// first `{` to the last `}` before parsing.
fn parse_json_object(text: &str) -> Result<serde_json::Value, ProviderError> {
    let trimmed = text.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            let preview: String = trimmed.chars().take(120).collect();
            return Err(ProviderError::Parse(format!(
                "no JSON object found in response: {preview}"
            )));
        }
    };
    serde_json::from_str::<serde_json::Value>(candidate)
        .map_err(|e| ProviderError::Parse(format!("invalid JSON object: {e}")))
}
