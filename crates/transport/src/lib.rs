//! Link layer for the obexbox engine.
//!
//! [`Connection`] reads OBEX request packets from any byte stream, feeds the
//! resulting events to a [`Session`](obexbox_engine::Session) and writes the
//! responses back. [`TcpServer`] accepts TCP connections and runs one
//! `Connection` per peer on a blocking worker.

mod driver;
mod server;

pub use driver::Connection;
pub use server::TcpServer;

use obexbox_protocol::ProtocolError;

/// Errors produced by the link layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
