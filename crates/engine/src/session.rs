//! Per-connection session state.

use std::net::SocketAddr;
use std::sync::Arc;

use obexbox_auth::{AuthContext, AuthState};
use obexbox_protocol::{Command, HeaderSet, MIN_PACKET_LEN, ResponseCode};
use obexbox_storage::{StorageHandle, TransferContext, VirtualPath};

use crate::config::EngineConfig;

/// Packet prefix plus one body header prefix.
const CHUNK_OVERHEAD: usize = 3 + 3;

/// Negotiated service of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Not connected, or the last CONNECT failed.
    None,
    ObjectPush,
    FileTransfer,
}

/// Response under construction for the current request.
#[derive(Debug, Clone)]
pub struct Response {
    pub code: ResponseCode,
    pub nonheader: Vec<u8>,
    pub headers: HeaderSet,
    /// Outgoing body chunk filled on `StreamEmpty`.
    pub body: Vec<u8>,
    /// Set once `body` holds the final chunk.
    pub last_chunk: bool,
}

impl Response {
    fn new() -> Self {
        Self {
            code: ResponseCode::NotImplemented,
            nonheader: Vec::new(),
            headers: HeaderSet::new(),
            body: Vec::new(),
            last_chunk: false,
        }
    }
}

/// Streaming bookkeeping of the current PUT or GET.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    /// At least one body header arrived (PUT).
    pub body_seen: bool,
    /// Bytes still to send when the length is known (GET).
    pub remaining: Option<u64>,
}

/// One connection's worth of engine state.
pub struct Session {
    id: u64,
    config: Arc<EngineConfig>,
    peer: Option<SocketAddr>,
    max_packet: u16,
    chunk_size: usize,
    closed: bool,
    pub(crate) request_count: u64,
    pub(crate) target: Target,
    pub(crate) auth: AuthContext,
    pub(crate) storage: StorageHandle,
    pub(crate) transfer: TransferContext,
    pub(crate) error: Option<ResponseCode>,
    pub(crate) last_command: Option<Command>,
    pub(crate) response: Response,
    pub(crate) stream: StreamState,
}

impl Session {
    pub fn new(config: Arc<EngineConfig>, peer: Option<SocketAddr>) -> Self {
        let id = config.ids.next();
        let auth = AuthContext::new(Arc::clone(&config.realms));
        let storage = StorageHandle::new(config.storage.create());
        let transfer = match peer {
            Some(addr) => TransferContext::with_peer(addr.to_string()),
            None => TransferContext::new(),
        };
        let max_packet = config.mtu;
        tracing::debug!(session = id, backend = storage.backend_name(), "session created");
        Self {
            id,
            config,
            peer,
            max_packet,
            chunk_size: usize::from(max_packet).saturating_sub(CHUNK_OVERHEAD),
            closed: false,
            request_count: 0,
            target: Target::None,
            auth,
            storage,
            transfer,
            error: None,
            last_command: None,
            response: Response::new(),
            stream: StreamState::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection-ID header value echoed on non-default CONNECTs.
    pub fn connection_id(&self) -> u32 {
        (self.id & u64::from(u32::MAX)) as u32
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn peer(&self) -> Option<&SocketAddr> {
        self.peer.as_ref()
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    pub fn path(&self) -> &VirtualPath {
        &self.transfer.path
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn last_error(&self) -> Option<ResponseCode> {
        self.error
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Packet size agreed during CONNECT.
    pub fn max_packet(&self) -> u16 {
        self.max_packet
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Caps the next outgoing body chunk; the transport sets this from the
    /// room left in the response packet.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size;
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn negotiate_packet_size(&mut self, requested: u16) {
        self.max_packet = requested.max(MIN_PACKET_LEN).min(self.config.mtu);
        self.chunk_size = usize::from(self.max_packet).saturating_sub(CHUNK_OVERHEAD);
    }

    /// Whether PUT, GET and SETPATH may run at all.
    pub(crate) fn is_admitted(&self) -> bool {
        if let Some(access) = &self.config.access {
            if !access.allows(self.peer.as_ref()) {
                return false;
            }
        }
        !self.auth.is_required() || self.auth.is_verified()
    }

    pub(crate) fn reset_response(&mut self) {
        self.response = Response::new();
    }

    /// Request-hint bookkeeping shared by the transfer handlers.
    pub(crate) fn begin_transfer(&mut self) {
        self.transfer.reset();
        self.request_count += 1;
        self.error = None;
        self.stream = StreamState::default();
    }

    /// Close phase: releases the open object and clears transfer fields.
    pub(crate) fn end_transfer(&mut self, keep: bool) {
        if let Err(e) = self.storage.close(&self.transfer, keep) {
            tracing::warn!(session = self.id, error = %e, "closing object failed");
        }
        self.transfer.reset();
        self.stream = StreamState::default();
    }

    /// Releases everything bound to the connection.
    pub(crate) fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.end_transfer(false);
        self.target = Target::None;
        self.transfer.path.clear();
        self.closed = true;
        tracing::info!(session = self.id, requests = self.request_count, "session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("target", &self.target)
            .field("auth", &self.auth.state())
            .field("path", &self.transfer.path.to_string())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
