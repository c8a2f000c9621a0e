//! Process-wide engine configuration handed to every session.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use obexbox_auth::{AuthError, Realm, validate_realms};
use obexbox_protocol::MIN_PACKET_LEN;
use obexbox_storage::BackendFactory;

/// Default maximum packet length offered to peers.
pub const DEFAULT_MTU: u16 = 0x7FFF;

bitflags! {
    /// OBEX services a deployment offers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Services: u8 {
        /// Object Push, the default service when CONNECT names no target.
        const OBJECT_PUSH = 0x01;
        /// File Transfer (folder browsing), selected by its target UUID.
        const FILE_TRANSFER = 0x02;
    }
}

/// Transport-level admission check for PUT, GET and SETPATH.
pub trait AccessControl: Send + Sync {
    fn allows(&self, peer: Option<&SocketAddr>) -> bool;
}

/// Admits only peers whose IP address is listed.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    addrs: HashSet<IpAddr>,
}

impl AllowList {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
        }
    }
}

impl AccessControl for AllowList {
    fn allows(&self, peer: Option<&SocketAddr>) -> bool {
        peer.is_some_and(|peer| self.addrs.contains(&peer.ip()))
    }
}

/// Allocates session ids. Ids start at 1.
#[derive(Debug, Default)]
pub struct SessionIds(AtomicU64);

impl SessionIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Configuration shared by all sessions of one server.
pub struct EngineConfig {
    pub services: Services,
    pub realms: Arc<[Realm]>,
    pub access: Option<Arc<dyn AccessControl>>,
    /// Largest packet the server accepts and sends.
    pub mtu: u16,
    pub storage: Arc<dyn BackendFactory>,
    pub ids: SessionIds,
}

impl EngineConfig {
    /// Both services, no authentication, no access control.
    pub fn new(storage: Arc<dyn BackendFactory>) -> Self {
        Self {
            services: Services::all(),
            realms: Arc::from(Vec::new()),
            access: None,
            mtu: DEFAULT_MTU,
            storage,
            ids: SessionIds::default(),
        }
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Installs the realm list after checking it.
    pub fn with_realms(mut self, realms: Vec<Realm>) -> Result<Self, AuthError> {
        validate_realms(&realms)?;
        self.realms = realms.into();
        Ok(self)
    }

    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu.max(MIN_PACKET_LEN);
        self
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("services", &self.services)
            .field("realms", &self.realms)
            .field("access", &self.access.is_some())
            .field("mtu", &self.mtu)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}
