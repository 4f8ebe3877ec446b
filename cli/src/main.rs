// gramline-relay — real-time chat and call-signaling relay
//
// Presence lives in memory for the lifetime of the process; message history,
// auth, and media transport belong to external collaborators.

mod config;
mod server;

use anyhow::Result;
use clap::Parser;
use config::RelayConfig;
use gramline_core::{IdentityRegistry, RelayRouter};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "gramline-relay")]
#[command(about = "Gramline — real-time chat and call-signaling relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Bind host (overrides HOST env var)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Bind port (overrides PORT env var)
    #[arg(short, long)]
    port: Option<u16>,

    /// Allowed CORS origin, repeatable (default: any origin)
    #[arg(long = "cors-origin", value_name = "ORIGIN")]
    cors_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = RelayConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if !cli.cors_origins.is_empty() {
        config.cors_origins = cli.cors_origins;
    }

    let cors = if config.allow_any_origin() {
        "any".to_string()
    } else {
        config.cors_origins.join(",")
    };
    info!(addr = %config.bind_addr(), %cors, "starting gramline relay");

    let registry = Arc::new(IdentityRegistry::new());
    let router = Arc::new(RelayRouter::new(registry));

    server::run(config, router).await
}
