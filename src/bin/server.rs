//! Keyward Server Binary
//!
//! Starts the TCP keyfile server.

use std::path::PathBuf;

use clap::Parser;
use keyward::{Config, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// Keyward Server
#[derive(Parser, Debug)]
#[command(name = "keyward-server")]
#[command(about = "Keyfile server speaking the keyward MessagePack protocol")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    listen: String,

    /// Snapshot file for keyfiles (kept in memory when omitted)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keyward=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Keyward Server v{}", keyward::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let mut builder = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections);
    if let Some(path) = &args.store {
        builder = builder.store_path(path);
    }
    let config = builder.build();

    let server = match Server::open(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
