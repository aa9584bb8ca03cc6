//! `lobe-proxy` binary entrypoint.
//!
//! Loads configuration (file, environment, flags) and starts the Actix server.

use clap::Parser;
use lobe_proxy::{serve, DecodeMode, ProxyConfig};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "lobe-proxy", version, about)]
struct Cli {
    /// Path to a YAML config file (default: ./lobe-proxy.yml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Fragment decoding: strict-json or raw-text
    #[arg(long)]
    decode_mode: Option<DecodeMode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respect `RUST_LOG` if set; otherwise default to proxy-friendly info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ProxyConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(mode) = cli.decode_mode {
        config.decode_mode = mode;
    }

    serve(config).await
}
