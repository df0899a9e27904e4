//! Dart Counter Server - Entry Point
//!
//! Starts the TCP listener and the session Coordinator, accepting connections.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dart_counter::{handle_connection, Config, Coordinator, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=dart_counter=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dart_counter=info")),
        )
        .init();

    let mut config = Config::from_env()?;

    // Bind address from command line overrides the environment
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }

    // Start TCP listener
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Dart Counter Server listening on {}", config.bind_addr);

    // Session workers are spawned on demand by the Coordinator
    let coordinator = Coordinator::new(Arc::new(MemoryStore::new()), config);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let coordinator = coordinator.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, coordinator).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
