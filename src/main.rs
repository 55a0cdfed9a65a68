//! relay-hub — WebSocket message relay broker.
//!
//! A single-process, in-memory, best-effort relay: clients connect over
//! WebSocket, register an identity, and address JSON payloads to other
//! identities. The broker forwards each payload to the connection currently
//! bound to the target identity.
//!
//! Usage:
//!   relay-hub                          # Listen on 0.0.0.0:8765
//!   relay-hub --port 9000              # Custom port
//!   relay-hub --hostname 127.0.0.1     # Localhost only

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use relay_server::{ClientRegistry, RelayRouter};
use relay_transport::{TransportConfig, TransportServer};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay-hub", about = "relay-hub — WebSocket message relay broker")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8765")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "0.0.0.0")]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if let Some(ref log_path) = cli.log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .unwrap_or_else(|e| panic!("Failed to open log file {}: {e}", log_path.display()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Process-wide state is exactly the registry, initialized empty.
    let registry = Arc::new(ClientRegistry::new());
    let router = Arc::new(RelayRouter::new(registry.clone()));

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        max_connections: Some(cli.max_connections),
    };

    let mut transport = match TransportServer::start_shared(config, router).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("  relay-hub running");
    println!();
    println!("  WebSocket endpoint:");
    println!("    ws://{}:{}/ws", cli.hostname, transport.port());
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");
}
