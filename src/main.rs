//! Live Chat server
//!
//! Entry point: loads configuration, connects the message store, and serves
//! the chat page with its live update stream.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use dotenvy::dotenv;
use tracing::info;

use live_chat::config::AppConfig;
use live_chat::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before RUST_LOG is read
    let _ = dotenv();

    telemetry::init();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        provider = %config.store.provider,
        policy = ?config.sync.policy,
        "Configuration loaded"
    );

    server::start_server(Arc::new(config)).await
}
