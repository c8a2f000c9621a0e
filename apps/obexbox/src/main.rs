//! obexbox server entry point.

mod app;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "obexbox", version)]
#[command(about = "OBEX Object Push and File Transfer server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage root, overriding the configuration.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log at debug level regardless of RUST_LOG.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting obexbox");

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("obexbox shut down cleanly");
    Ok(())
}
