//! Multi-user TCP Chat Server - Entry Point
//!
//! Loads the user store, binds the listener and accepts connections until
//! Ctrl-C.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lobby_chat::{ChatServer, Config, UserStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=lobby_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lobby_chat=info")),
        )
        .init();

    let config = Config::from_env()?;

    // The store lives exactly as long as the server
    let store = Arc::new(UserStore::open(&config.users_file).await?);

    let server = ChatServer::bind(&config, store).await?;
    info!(
        "Chat server listening on {} (auth window {:?})",
        server.local_addr()?,
        config.auth_timeout
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
