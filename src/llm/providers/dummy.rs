//! Dummy LLM provider — echoes input, or replays a scripted response queue.
//!
//! Used for testing the agent loop without a real API key. The scripted mode
//! makes the state machine fully deterministic: each call pops the next
//! response, so a test can pre-load guardrail, router, and grading JSON in
//! the exact order the engine will consume them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::llm::{ChatMessage, LlmResponse, ProviderError, TokenStream};

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    script: Arc<Mutex<VecDeque<String>>>,
}

impl DummyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that replays `responses` in order, then falls back to echo.
    pub fn scripted(responses: Vec<String>) -> Self {
        Self {
            script: Arc::new(Mutex::new(responses.into())),
        }
    }

    fn next_response(&self, messages: &[ChatMessage]) -> String {
        let scripted = self
            .script
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front());
        scripted.unwrap_or_else(|| {
            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.as_str())
                .unwrap_or("");
            format!("[echo] {last_user}")
        })
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmResponse, ProviderError> {
        Ok(LlmResponse {
            text: self.next_response(messages),
            usage: None,
        })
    }

    /// Streams the next response split into word tokens.
    pub async fn stream_tokens(
        &self,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, ProviderError> {
        let text = self.next_response(messages);
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for token in text.split_inclusive(' ') {
                if tx.send(Ok(token.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_echoes_last_user_message() {
        let p = DummyProvider::new();
        let msgs = [ChatMessage::system("sys"), ChatMessage::user("hello")];
        assert_eq!(p.complete(&msgs).await.unwrap().text, "[echo] hello");
    }

    #[tokio::test]
    async fn scripted_responses_replay_in_order() {
        let p = DummyProvider::scripted(vec!["one".into(), "two".into()]);
        let msgs = [ChatMessage::user("q")];
        assert_eq!(p.complete(&msgs).await.unwrap().text, "one");
        assert_eq!(p.complete(&msgs).await.unwrap().text, "two");
        // Script exhausted — falls back to echo.
        assert_eq!(p.complete(&msgs).await.unwrap().text, "[echo] q");
    }

    #[tokio::test]
    async fn stream_splits_into_tokens() {
        let p = DummyProvider::scripted(vec!["alpha beta gamma".into()]);
        let mut rx = p.stream_tokens(&[ChatMessage::user("q")]).await.unwrap();
        let mut collected = String::new();
        while let Some(tok) = rx.recv().await {
            collected.push_str(&tok.unwrap());
        }
        assert_eq!(collected, "alpha beta gamma");
    }
}
