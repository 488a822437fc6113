//! Embeddings client.
//!
//! Enum dispatch over two backends:
//! - [`RemoteEmbeddings`] — OpenAI-compatible `/embeddings` endpoint.
//! - [`HashedEmbeddings`] — deterministic local token-hash vectors, used for
//!   tests and offline runs. No model quality, full reproducibility.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::EmbeddingsConfig;
use crate::error::AppError;

// ── Client enum ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum EmbeddingsClient {
    Remote(RemoteEmbeddings),
    Hashed(HashedEmbeddings),
}

impl EmbeddingsClient {
    /// Build a client from config. `api_key` comes from `EMBEDDINGS_API_KEY`
    /// env — never TOML.
    pub fn build(config: &EmbeddingsConfig, api_key: Option<String>) -> Result<Self, AppError> {
        match config.provider.as_str() {
            "remote" => Ok(EmbeddingsClient::Remote(RemoteEmbeddings::new(
                config.api_base_url.clone(),
                config.model.clone(),
                config.dimension,
                config.timeout_seconds,
                api_key,
            )?)),
            "hashed" => Ok(EmbeddingsClient::Hashed(HashedEmbeddings::new(config.dimension))),
            other => Err(AppError::Config(format!("unknown embeddings provider: {other}"))),
        }
    }

    /// Vector dimension every returned embedding has.
    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingsClient::Remote(c) => c.dimension,
            EmbeddingsClient::Hashed(c) => c.dimension,
        }
    }

    /// Embed a batch of texts. One vector per input, in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        match self {
            EmbeddingsClient::Remote(c) => c.embed(texts).await,
            EmbeddingsClient::Hashed(c) => Ok(texts.iter().map(|t| c.embed_one(t)).collect()),
        }
    }
}

// ── Remote backend ────────────────────────────────────────────────────────────

/// Adapter for OpenAI-compatible `/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct RemoteEmbeddings {
    client: Client,
    api_base_url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
}

impl RemoteEmbeddings {
    pub fn new(
        api_base_url: String,
        model: String,
        dimension: usize,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Search(format!("embeddings: build HTTP client: {e}")))?;
        Ok(Self { client, api_base_url, model, dimension, api_key })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch = texts.len(), "sending embeddings request");

        let payload = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dimension,
        });

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "embeddings request failed (transport)");
            AppError::Search(format!("embedding service unavailable: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Search(format!(
                "embedding service unavailable: HTTP {status}: {body}"
            )));
        }

        let parsed = response
            .json::<EmbeddingsResponse>()
            .await
            .map_err(|e| AppError::Search(format!("embeddings: parse response: {e}")))?;

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != self.dimension {
                return Err(AppError::Search(format!(
                    "embeddings: got dimension {}, expected {}",
                    item.embedding.len(),
                    self.dimension
                )));
            }
            vectors.push(item.embedding);
        }
        if vectors.len() != texts.len() {
            return Err(AppError::Search(format!(
                "embeddings: got {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

// ── Hashed backend ────────────────────────────────────────────────────────────

/// Deterministic token-hash embedder.
///
/// Each lowercase alphanumeric token is FNV-1a hashed; the hash selects a
/// dimension and a sign, the vector is L2-normalised. Stable across
/// platforms and processes, which is what the search tests rely on.
#[derive(Debug, Clone)]
pub struct HashedEmbeddings {
    dimension: usize,
}

impl HashedEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let idx = (h % self.dimension as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// FNV-1a 64-bit. Hand-rolled so hashes are stable across std releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
