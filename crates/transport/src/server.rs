//! TCP accept loop.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use obexbox_engine::{EngineConfig, Session};

use crate::TransportError;
use crate::driver::Connection;

/// Accepts OBEX peers over TCP.
///
/// Each connection gets its own [`Session`] and runs on a blocking worker
/// until the peer disconnects or the server shuts down.
pub struct TcpServer {
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    /// Live links by session id, kept so shutdown can unblock their workers.
    links: Mutex<HashMap<u64, std::net::TcpStream>>,
}

impl TcpServer {
    pub fn new(config: Arc<EngineConfig>) -> Arc<Self> {
        Arc::new(Self {
            config,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            links: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available once [`serve`](Self::serve) has started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Number of connections currently being served.
    pub async fn active_sessions(&self) -> usize {
        self.links.lock().await.len()
    }

    /// Stops accepting and closes every live link.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds `addr` and serves until shutdown.
    pub async fn run(self: &Arc<Self>, addr: SocketAddr) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), TransportError> {
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("obex server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    self.close_links().await;
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if let Err(e) = self.start(stream, peer).await {
                                tracing::error!(%peer, "cannot start session: {e}");
                            }
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn start(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> Result<(), TransportError> {
        let stream = stream.into_std()?;
        stream.set_nonblocking(false)?;
        let link = stream.try_clone()?;

        let session = Session::new(Arc::clone(&self.config), Some(peer));
        let id = session.id();
        self.links.lock().await.insert(id, link);
        tracing::info!(session = id, %peer, "connection accepted");

        let server = Arc::clone(self);
        tokio::spawn(async move {
            let worker = tokio::task::spawn_blocking(move || {
                let span = tracing::info_span!("session", id = id, %peer);
                let _guard = span.enter();
                Connection::new(stream, session).serve()
            });
            let result = worker.await;
            server.links.lock().await.remove(&id);
            match result {
                Ok(Ok(())) => tracing::debug!(session = id, "connection finished"),
                Ok(Err(e)) => tracing::warn!(session = id, "connection ended: {e}"),
                Err(e) => tracing::error!(session = id, "connection worker failed: {e}"),
            }
        });
        Ok(())
    }

    async fn close_links(&self) {
        for (id, link) in self.links.lock().await.drain() {
            if let Err(e) = link.shutdown(Shutdown::Both) {
                tracing::debug!(session = id, "link shutdown: {e}");
            }
        }
    }
}
