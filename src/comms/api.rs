//! Axum handlers for the service API.
//!
//! Each handler receives [`ApiState`] via [`axum::extract::State`] and
//! returns an axum [`Response`]. Status mapping: 400 on validation errors
//! surfaced before the stream starts, 404 on unknown sessions, 500 on
//! store failures, 200 for streams (errors after the first event ride the
//! stream itself).

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::agent::service::AskRequest;
use crate::error::AppError;

use super::sse;
use super::ApiState;

const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct PageParams {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

/// Map service errors raised before the stream starts.
fn error_response(e: AppError) -> Response {
    match e {
        AppError::Agent(_) | AppError::Config(_) | AppError::Provider(_) => {
            (StatusCode::BAD_REQUEST, json_error("invalid_request", e)).into_response()
        }
        other => {
            warn!(error = %other, "request failed before stream start");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("internal", other)).into_response()
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /health
pub(super) async fn health() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// POST /stream — run the agent, stream lifecycle events as SSE.
pub(super) async fn stream(
    State(state): State<ApiState>,
    Json(request): Json<AskRequest>,
) -> Response {
    match state.service.ask(request) {
        Ok(rx) => {
            let stream = ReceiverStream::new(rx)
                .map(|event| Ok::<_, Infallible>(sse::encode(&event)));
            Sse::new(stream).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /conversations?offset&limit
pub(super) async fn list_conversations(
    State(state): State<ApiState>,
    Query(page): Query<PageParams>,
) -> Response {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    match state.service.conversations().list_sessions(page.offset, limit) {
        Ok((sessions, total)) => (
            StatusCode::OK,
            Json(json!({
                "total": total,
                "offset": page.offset,
                "limit": limit,
                "conversations": sessions,
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "session listing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("internal", e)).into_response()
        }
    }
}

/// GET /conversations/{session_id}
pub(super) async fn conversation_detail(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.service.conversations().get_conversation(&session_id) {
        Ok(Some((record, turns))) => (
            StatusCode::OK,
            Json(json!({
                "session_id": record.session_id,
                "created_at": record.created_at,
                "updated_at": record.updated_at,
                "turns": turns,
            })),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            json_error("not_found", format!("unknown session: {session_id}")),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, session_id, "conversation detail failed");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("internal", e)).into_response()
        }
    }
}

/// DELETE /conversations/{session_id}
pub(super) async fn delete_conversation(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.service.conversations().delete(&session_id) {
        Ok(Some(turns_deleted)) => (
            StatusCode::OK,
            Json(json!({ "session_id": session_id, "turns_deleted": turns_deleted })),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            json_error("not_found", format!("unknown session: {session_id}")),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, session_id, "conversation delete failed");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("internal", e)).into_response()
        }
    }
}
