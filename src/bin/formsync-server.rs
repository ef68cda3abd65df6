//! formsync-server - HTTP/SSE server for accident-report form state sync.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (127.0.0.1:8000, settings from ~/.formsync/settings.toml)
//! formsync-server
//!
//! # Bind elsewhere and log verbosely
//! formsync-server --host 0.0.0.0 --port 9000 -v
//!
//! # Explicit settings file
//! formsync-server --config ./settings.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use formsync::config::{settings_path, SettingsManager};
use formsync::server::start_server;

/// formsync server - form state synchronization over HTTP/SSE
#[derive(Parser, Debug, Clone)]
#[command(name = "formsync-server")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Override bind host from settings
    #[arg(long)]
    pub host: Option<String>,

    /// Override bind port from settings
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Settings file path (default: ~/.formsync/settings.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Gemini API key (overrides settings and env vars)
    #[arg(long, env = "GEMINI_API_KEY")]
    pub api_key: Option<String>,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads env-backed arguments
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("formsync={}", log_level).parse().unwrap()),
        )
        .try_init();

    let manager = match &args.config {
        Some(path) => SettingsManager::from_path(path.clone()).await?,
        None => SettingsManager::from_path(settings_path()).await?,
    };
    let mut settings = manager.get().await;

    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(key) = args.api_key {
        settings.analysis.gemini_api_key = Some(key);
    }

    let (addr, shutdown) = start_server(&settings).await?;
    tracing::info!("formsync-server ready on http://{}", addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    Ok(())
}
