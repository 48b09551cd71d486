use anyhow::{Context, Result};
use clap::Parser;
use meshflow_core::{logging, MeshAddress, NodeConfig};
use meshflow_mesh::{NodeRuntime, TrafficHandle};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// MeshFlow export node
#[derive(Debug, Parser)]
#[command(name = "meshflow-node", version, about)]
struct Cli {
    /// Path to the node's TOML configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Read traffic observations from stdin, one `<ipv6> <bytes>` per line
    #[arg(long)]
    stdin_traffic: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init_from_config(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        role = %config.node.role,
        address = %config.node.address,
        "Starting meshflow node"
    );

    let runtime = NodeRuntime::bind(&config)
        .await
        .context("starting node runtime")?;
    info!(local = %runtime.local_addr()?, "Listening for mesh datagrams");

    if cli.stdin_traffic {
        let traffic = runtime.traffic_handle();
        tokio::spawn(async move {
            if let Err(e) = feed_stdin(traffic).await {
                warn!(error = %e, "Traffic feed stopped");
            }
        });
    }

    runtime.run().await.context("node runtime failed")?;
    info!("Node stopped");
    Ok(())
}

async fn feed_stdin(traffic: TrafficHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_observation(line) {
            Some((destination, bytes)) => traffic.observe_wait(destination, bytes).await?,
            None => warn!(line, "Ignoring malformed traffic line"),
        }
    }
    Ok(())
}

fn parse_observation(line: &str) -> Option<(MeshAddress, u64)> {
    let mut parts = line.split_whitespace();
    let destination = parts.next()?.parse().ok()?;
    let bytes = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((destination, bytes))
}
