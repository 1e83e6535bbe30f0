use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ripd::{RipConfig, RipRoutingDaemon, RouterConfig};

/// A distance-vector routing daemon speaking RIPv2-style updates over
/// loopback UDP.
#[derive(Debug, Parser)]
#[command(name = "ripd", version)]
struct Args {
    /// Path to the router configuration file.
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        tracing::error!(%err, "fatal");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(args: Args) -> Result<(), ripd::Error> {
    let router = RouterConfig::load(&args.config)?;
    let daemon = RipRoutingDaemon::bind(router, RipConfig::default()).await?;
    daemon.deploy().await
}
