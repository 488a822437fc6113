//! Paperbot — service entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config (path from first CLI arg, else config/default.toml)
//!   3. Init logger at configured level
//!   4. Open paper and conversation stores under the work dir
//!   5. Build embeddings client and agent service
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Serve HTTP until shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use paperbot::agent::service::AgentService;
use paperbot::memory::ConversationStore;
use paperbot::search::{EmbeddingsClient, HybridSearch, PaperStore};
use paperbot::{bootstrap, comms, config, error};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let config_path = std::env::args().nth(1);
    let config = config::load(config_path.as_deref())?;

    bootstrap::logger::init(&config.service.log_level)?;

    info!(
        service = %config.service.name,
        work_dir = %config.service.work_dir.display(),
        bind = %config.service.bind,
        provider = %config.llm.default_provider,
        "config loaded"
    );

    std::fs::create_dir_all(&config.service.work_dir)?;

    let papers = PaperStore::open(&config.papers_db_path(), config.embeddings.dimension)?;
    let embeddings = EmbeddingsClient::build(&config.embeddings, config.embeddings_api_key.clone())?;
    let search = HybridSearch::new(papers, embeddings);
    let conversations = ConversationStore::open(&config.conversations_db_path())?;

    let config = Arc::new(config);
    let service = Arc::new(AgentService::new(Arc::clone(&config), search, conversations)?);

    // Shared shutdown token — Ctrl-C cancels it, the server watches it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    comms::serve(&config, service, shutdown).await
}
