//! Wires the configuration into a running server.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use obexbox_transport::TcpServer;

use crate::config::Config;

/// Serves until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    anyhow::ensure!(
        config.root.is_dir(),
        "storage root {} is not a directory",
        config.root.display()
    );

    let engine = config.engine_config()?;
    tracing::info!(
        root = %config.root.display(),
        backend = ?config.backend,
        services = ?engine.services,
        realms = engine.realms.len(),
        mtu = engine.mtu,
        "configuration loaded"
    );

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("cannot listen on {}", config.listen))?;

    let server = TcpServer::new(Arc::new(engine));
    let server_run = Arc::clone(&server);
    let task = tokio::spawn(async move { server_run.serve(listener).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received");
    server.shutdown();
    task.await??;
    Ok(())
}
