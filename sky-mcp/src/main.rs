//! sky-mcp service entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sky_common::config::Config;
use sky_common::logging::{init_logging, with_startup_logging};

/// Serve recent Bluesky posts to MCP clients.
#[derive(Parser, Debug)]
#[command(name = "sky-mcp")]
#[command(version)]
#[command(about = "MCP server exposing the most recent Bluesky Jetstream posts", long_about = None)]
struct Cli {
    /// Config file (default: ~/.skyfeed/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP port for the MCP endpoint
    #[arg(long = "mcp-port", visible_alias = "port", alias = "mcpPort")]
    mcp_port: Option<u16>,

    /// Number of recent posts to keep
    #[arg(short = 'n')]
    capacity: Option<usize>,

    /// Do not log each ingested post
    #[arg(long)]
    silent: bool,

    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    /// Collection NSID to subscribe to (repeatable)
    #[arg(long = "collection")]
    collections: Vec<String>,

    /// Author DID to subscribe to (repeatable)
    #[arg(long = "did")]
    dids: Vec<String>,

    /// Jetstream subscribe endpoint
    #[arg(long)]
    jetstream_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    /// Command-line flags win over file and environment.
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.mcp_port {
            config.server.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.buffer.capacity = capacity;
        }
        if self.silent {
            config.observability.silent = true;
        }
        if let Some(bind) = self.bind {
            config.network.bind = bind;
        }
        if !self.collections.is_empty() {
            config.jetstream.wanted_collections = self.collections;
        }
        if !self.dids.is_empty() {
            config.jetstream.wanted_dids = self.dids;
        }
        if let Some(url) = self.jetstream_url {
            config.jetstream.endpoint = url;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let cli = Cli::parse();
    // Loading may warn about ignored overrides before logging is configured
    let mut config = with_startup_logging(|| Config::load_with_env(cli.config.as_deref()))?;
    cli.apply(&mut config);

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    config.validate().context("Invalid configuration")?;

    tracing::info!("Sky MCP v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        duration_ms = startup_start.elapsed().as_millis() as u64,
        "Configuration loaded"
    );

    sky_mcp::start_server(&config).await
}
