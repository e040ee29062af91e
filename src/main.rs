use std::{error::Error, path::PathBuf, sync::Arc};

use clap::Parser;
use hub_mcp::{HubConfig, McpHub};
use rmcp::{transport::stdio, ServiceExt};
use tracing::{info, warn};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

mod server;

use server::HubServer;

#[derive(Parser, Debug)]
#[command(
    name = "mcp-hub",
    version,
    about = "Serve many stdio MCP servers through one meta-tool MCP server"
)]
struct Cli {
    /// Hub configuration file (YAML or JSON)
    #[arg(short, long, env = "MCP_HUB_CONFIG")]
    config: PathBuf,

    /// Directory for persisted tool catalogs
    #[arg(long, env = "MCP_HUB_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Keep tool catalogs in memory only
    #[arg(long)]
    no_cache: bool,

    /// Log filter, e.g. `debug` or `hub_mcp=trace` (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line cache overrides to the loaded configuration.
    fn apply(&self, config: &mut HubConfig) {
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

/// Logs go to stderr: stdout carries the MCP protocol.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let mut config = HubConfig::from_file(&cli.config).await?;
    cli.apply(&mut config);
    info!(
        "Loaded {} backends from {}",
        config.servers.len(),
        cli.config.display()
    );

    let hub = Arc::new(McpHub::new(config).await);
    let service = HubServer::new(Arc::clone(&hub)).serve(stdio()).await?;
    let cancel = service.cancellation_token();

    tokio::select! {
        quit = service.waiting() => {
            match quit {
                Ok(reason) => info!("MCP client disconnected: {:?}", reason),
                Err(e) => warn!("MCP server task failed: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            cancel.cancel();
        }
    }

    let failures = hub.shutdown().await;
    if failures > 0 {
        warn!("{} backend sessions did not close cleanly", failures);
    }
    Ok(())
}
