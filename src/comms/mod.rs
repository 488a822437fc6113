//! HTTP surface — axum server for the streaming and conversation APIs.
//!
//! ## URL layout
//!
//! ```text
//! POST   /stream                       agent run as text/event-stream
//! GET    /conversations                paginated session listing
//! GET    /conversations/{session_id}   full turn history
//! DELETE /conversations/{session_id}   delete session and turns
//! GET    /health                       liveness probe
//! ```

mod api;
pub mod sse;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::service::AgentService;
use crate::config::Config;
use crate::error::AppError;

/// Axum router state injected into every handler.
///
/// Cheap to clone — the service is reference-counted.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<AgentService>,
}

/// Run the HTTP server until `shutdown` is cancelled.
pub async fn serve(
    config: &Config,
    service: Arc<AgentService>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(ApiState { service });

    let bind = &config.service.bind;
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| AppError::Comms(format!("bind failed on {bind}: {e}")))?;

    info!(%bind, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}

fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/stream", post(api::stream))
        .route("/conversations", get(api::list_conversations))
        .route(
            "/conversations/{session_id}",
            get(api::conversation_detail).delete(api::delete_conversation),
        )
        .route("/health", get(api::health))
        .with_state(state)
}
