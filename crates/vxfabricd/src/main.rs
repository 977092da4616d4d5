//! Fabric Controller Daemon Entry Point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vxfabric_common::FabricConfig;
use vxfabricd::FabricMgr;

#[derive(Debug, Parser)]
#[command(name = "vxfabricd", about = "VXLAN overlay fabric controller")]
struct Args {
    /// Path to the daemon configuration file.
    #[arg(long, default_value = "/etc/vxfabric/vxfabricd.yaml")]
    config: PathBuf,

    /// Log filter (overrides RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_level.as_deref());

    info!("Starting vxfabricd");

    let config = FabricConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let config = Arc::new(config);

    info!(
        master = %config.master_address,
        local = %config.local_tunnel_address,
        ovsdb_port = config.ovsdb_port,
        bridge = %config.bridge,
        "Configuration loaded"
    );

    let (event_tx, event_rx) = mpsc::channel(config.event_queue_depth);
    let mgr = FabricMgr::new(Arc::clone(&config));

    // TODO: hand event_tx to the OpenFlow lifecycle adapter once the
    // southbound integration lands; until then the loop idles and drains
    // cleanly on shutdown.
    let _event_tx = event_tx;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, shutting down");
            signal_token.cancel();
        }
    });

    mgr.run(event_rx, shutdown).await;

    info!("vxfabricd exiting");
    Ok(())
}

fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
