//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! All OpenAI wire types are private to this module — callers never see them.
//! Covers OpenAI, OpenAI-compatible local servers (Ollama, LM Studio…), and
//! hosted alternatives. Constructed once per request, then cheaply cloned
//! because `reqwest::Client` is an `Arc` internally.
//!
//! Three entry points: [`complete`](OpenAiCompatibleProvider::complete)
//! (plain text), [`complete_json`](OpenAiCompatibleProvider::complete_json)
//! (JSON mode via `response_format`), and
//! [`stream_tokens`](OpenAiCompatibleProvider::stream_tokens) (SSE deltas).

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::llm::{ChatMessage, LlmResponse, LlmUsage, ProviderError, TokenStream};

/// Buffer size of the token channel handed to the consumer.
const TOKEN_CHANNEL_CAPACITY: usize = 64;

// ── Public provider ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
    pub fn new(
        api_base_url: String,
        model: String,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, api_key })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One round-trip chat completion.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, ProviderError> {
        self.complete_inner(messages, temperature, max_tokens, None).await
    }

    /// One round-trip completion with JSON mode requested.
    ///
    /// The response text is still returned verbatim; parsing happens at the
    /// `LlmProvider` layer so the retry policy lives in one place.
    pub async fn complete_json(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, ProviderError> {
        let format = serde_json::json!({ "type": "json_object" });
        self.complete_inner(messages, temperature, max_tokens, Some(format)).await
    }

    async fn complete_inner(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
        response_format: Option<serde_json::Value>,
    ) -> Result<LlmResponse, ProviderError> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: temperature_for(&self.model, temperature),
            max_tokens,
            stream: None,
            response_format,
        };

        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            messages = messages.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))?;

        let usage = parsed.usage.map(|u| LlmUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(LlmResponse { text, usage })
    }

    /// Streaming completion. Returns a receiver of token results; the sender
    /// side is driven by a spawned task reading the SSE body.
    ///
    /// Dropping the receiver aborts the transfer — the task's next send fails
    /// and it stops reading the body.
    pub async fn stream_tokens(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<TokenStream, ProviderError> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: temperature_for(&self.model, temperature),
            max_tokens,
            stream: Some(true),
            response_format: None,
        };

        debug!(model = %payload.model, messages = messages.len(), "opening LLM token stream");

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM stream request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::Stream(e.to_string()))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE frames are separated by a blank line.
                while let Some(pos) = buffer.find("\n\n") {
                    let frame = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);
                    for token in parse_sse_frame(&frame) {
                        match token {
                            SseItem::Token(t) => {
                                if tx.send(Ok(t)).await.is_err() {
                                    // Consumer hung up — stop reading.
                                    return;
                                }
                            }
                            SseItem::Done => return,
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Some models (gpt-5 family) do not accept a temperature parameter.
fn temperature_for(model: &str, temperature: f32) -> Option<f32> {
    if model.starts_with("gpt-5") {
        None
    } else {
        Some(temperature)
    }
}

// ── SSE parsing ───────────────────────────────────────────────────────────────

enum SseItem {
    Token(String),
    Done,
}

/// Extract delta tokens from one SSE frame of an OpenAI-style stream.
///
/// Frames carry `data: {json}` lines; the terminal frame is `data: [DONE]`.
/// Malformed lines are skipped — a stray keep-alive must not kill the stream.
fn parse_sse_frame(frame: &str) -> Vec<SseItem> {
    let mut items = Vec::new();
    for line in frame.lines() {
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            continue;
        };
        if data == "[DONE]" {
            items.push(SseItem::Done);
            continue;
        }
        if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
            for choice in chunk.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        items.push(SseItem::Token(content));
                    }
                }
            }
        }
    }
    items
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}
