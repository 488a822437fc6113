//! Server-sent-event encoding of agent lifecycle events.
//!
//! Wire shape per event:
//!
//! ```text
//! event: <type>
//! data: <json>
//!
//! ```
//!
//! Types: `status`, `content`, `sources`, `metadata`, `error`, `done`.
//! The transport flushes after each event; the connection closes after
//! `done` or on client disconnect (which cancels the engine).

use axum::response::sse::Event;

use crate::agent::events::AgentEvent;

/// Encode one event for axum's SSE response.
pub fn encode(event: &AgentEvent) -> Event {
    Event::default()
        .event(event.event_type())
        .data(event.data_json().to_string())
}

/// The raw frame as it appears on the wire. Used by tests asserting the
/// documented shape byte for byte.
pub fn encode_frame(event: &AgentEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.event_type(), event.data_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::AgentEvent;

    #[test]
    fn frame_shape_matches_wire_contract() {
        let frame = encode_frame(&AgentEvent::Content { token: "hi".into() });
        assert_eq!(frame, "event: content\ndata: {\"token\":\"hi\"}\n\n");
    }

    #[test]
    fn done_frame_is_empty_object() {
        let frame = encode_frame(&AgentEvent::Done);
        assert_eq!(frame, "event: done\ndata: {}\n\n");
    }

    #[test]
    fn status_frame_carries_step() {
        let frame = encode_frame(&AgentEvent::Status {
            step: "guardrail".into(),
            message: "Validating query scope".into(),
            details: None,
        });
        assert!(frame.starts_with("event: status\n"));
        assert!(frame.contains("\"step\":\"guardrail\""));
    }
}
