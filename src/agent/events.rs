//! Lifecycle event channel between the engine and the streaming transport.
//!
//! Single producer (the engine task), single consumer (the SSE encoder).
//! Events are emitted atomically in causal order over a bounded mpsc
//! channel. When the consumer hangs up — client disconnect — the next
//! [`EventSender::emit`] returns [`Cancelled`] and the engine winds down
//! without persisting anything.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::memory::SourceRecord;

/// Buffer size of the event channel. Content tokens dominate the volume;
/// a small buffer keeps backpressure tight without stalling the LLM stream.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ── Events ────────────────────────────────────────────────────────────────────

/// Final execution metadata, emitted once before `Done`.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataPayload {
    pub query: String,
    pub execution_time_ms: f64,
    pub retrieval_attempts: u32,
    pub rewritten_query: Option<String>,
    pub guardrail_score: Option<u8>,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Assigned turn number; `-1` signals a persistence failure after the
    /// answer already streamed.
    pub turn_number: i64,
    pub reasoning_steps: Vec<String>,
}

/// Tagged lifecycle event.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Status {
        step: String,
        message: String,
        details: Option<serde_json::Value>,
    },
    Content {
        token: String,
    },
    Sources {
        sources: Vec<SourceRecord>,
    },
    Metadata(MetadataPayload),
    Error {
        error: String,
        code: Option<String>,
    },
    Done,
}

impl AgentEvent {
    /// Wire event name, matching the SSE `event:` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::Status { .. } => "status",
            AgentEvent::Content { .. } => "content",
            AgentEvent::Sources { .. } => "sources",
            AgentEvent::Metadata(_) => "metadata",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Done => "done",
        }
    }

    /// JSON body for the SSE `data:` field.
    pub fn data_json(&self) -> serde_json::Value {
        match self {
            AgentEvent::Status { step, message, details } => {
                let mut obj = serde_json::json!({ "step": step, "message": message });
                if let Some(details) = details {
                    obj["details"] = details.clone();
                }
                obj
            }
            AgentEvent::Content { token } => serde_json::json!({ "token": token }),
            AgentEvent::Sources { sources } => serde_json::json!({ "sources": sources }),
            AgentEvent::Metadata(payload) => {
                serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({}))
            }
            AgentEvent::Error { error, code } => {
                let mut obj = serde_json::json!({ "error": error });
                if let Some(code) = code {
                    obj["code"] = serde_json::Value::String(code.clone());
                }
                obj
            }
            AgentEvent::Done => serde_json::json!({}),
        }
    }
}

// ── Sender ────────────────────────────────────────────────────────────────────

/// The consumer closed the channel; the engine must stop cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Producer half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSender {
    /// Create a channel; the receiver goes to the transport.
    pub fn channel() -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Emit one event. `Err(Cancelled)` means the consumer hung up.
    pub async fn emit(&self, event: AgentEvent) -> Result<(), Cancelled> {
        self.tx.send(event).await.map_err(|_| Cancelled)
    }

    /// Convenience for `Status` events.
    pub async fn status(
        &self,
        step: &str,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Result<(), Cancelled> {
        self.emit(AgentEvent::Status {
            step: step.to_string(),
            message: message.into(),
            details,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_match_wire_names() {
        assert_eq!(AgentEvent::Done.event_type(), "done");
        assert_eq!(AgentEvent::Content { token: "x".into() }.event_type(), "content");
    }

    #[test]
    fn status_details_omitted_when_none() {
        let e = AgentEvent::Status { step: "guardrail".into(), message: "m".into(), details: None };
        let json = e.data_json();
        assert!(json.get("details").is_none());
        assert_eq!(json["step"], "guardrail");
    }

    #[test]
    fn error_code_included_when_present() {
        let e = AgentEvent::Error { error: "boom".into(), code: Some("cancelled".into()) };
        assert_eq!(e.data_json()["code"], "cancelled");
    }

    #[tokio::test]
    async fn emit_after_receiver_drop_is_cancelled() {
        let (sender, rx) = EventSender::channel();
        drop(rx);
        assert_eq!(sender.emit(AgentEvent::Done).await, Err(Cancelled));
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sender, mut rx) = EventSender::channel();
        sender.status("guardrail", "start", None).await.unwrap();
        sender.emit(AgentEvent::Content { token: "a".into() }).await.unwrap();
        sender.emit(AgentEvent::Done).await.unwrap();
        drop(sender);

        let mut types = Vec::new();
        while let Some(e) = rx.recv().await {
            types.push(e.event_type());
        }
        assert_eq!(types, vec!["status", "content", "done"]);
    }
}
