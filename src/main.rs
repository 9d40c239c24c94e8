//! Room broadcast server - Entry Point
//!
//! Loads configuration, binds the listener and serves the router.

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomcast::{serve, AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=roomcast=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomcast=info")),
        )
        .init();

    // Bind address from command line, then SERVER_ADDRESS, then default
    let config = Config::load();

    let listener = TcpListener::bind(&config.addr).await?;
    info!("Room broadcast server listening on {}", config.addr);
    info!(
        "Mailbox capacity {}, echo policy {:?}",
        config.mailbox_capacity, config.room.echo
    );

    serve(listener, AppState::new(config)).await?;
    Ok(())
}
