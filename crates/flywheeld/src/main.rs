//! flywheel — scale-to-zero HTTP gateway.
//!
//! Fronts a backend whose compute resources are stopped while idle. The
//! first request starts them, traffic keeps them running, and an idle
//! timeout stops them again.
//!
//! # Usage
//!
//! ```text
//! flywheel --config /etc/flywheel.json --listen 0.0.0.0:80 \
//!          --status-file /var/lib/flywheel/status.json --setuid nobody
//! ```

mod gateway;
mod privileges;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use flywheel_core::VersionInfo;

#[derive(Parser)]
#[command(name = "flywheel", about = "Scale-to-zero HTTP gateway", disable_version_flag = true)]
struct Cli {
    /// Address and port to listen on.
    #[arg(long, default_value = "0.0.0.0:80")]
    listen: String,

    /// Configuration file (JSON, or TOML with a .toml extension).
    #[arg(long)]
    config: Option<PathBuf>,

    /// File the lifecycle status is restored from and saved to.
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Switch to this user after opening the listening socket.
    #[arg(long)]
    setuid: Option<String>,

    /// Print the version and exit.
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("flywheel {}", VersionInfo::current());
        return Ok(());
    }

    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,flywheel=debug")),
        )
        .init();

    let config = cli
        .config
        .context("config file missing, run with --help for usage")?;

    gateway::run(gateway::Options {
        listen: cli.listen,
        config,
        status_file: cli.status_file,
        setuid: cli.setuid,
    })
    .await
}
