//! Server configuration, stored as TOML.
//!
//! ```toml
//! listen = "0.0.0.0:650"
//! root = "/srv/obex"
//! backend = "hybrid"
//! helper = "/usr/libexec/obexbox-helper"
//! ftp = true
//! push = true
//! allow = ["192.168.1.20"]
//!
//! [[realm]]
//! name = "inbox"
//! options = ["user-id"]
//! credentials = "/etc/obexbox/inbox.passwd"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use obexbox_auth::{ChallengeOptions, Credentials, Realm};
use obexbox_engine::{AllowList, DEFAULT_MTU, EngineConfig, Services};
use obexbox_storage::{BackendKind, StorageConfig};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the TCP listener binds.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory objects are stored under.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub backend: BackendChoice,

    /// External program for the script backend (required) or the hybrid one.
    #[serde(default)]
    pub helper: Option<PathBuf>,

    /// Offer the File Transfer service.
    #[serde(default = "default_true")]
    pub ftp: bool,

    /// Offer the Object Push service.
    #[serde(default = "default_true")]
    pub push: bool,

    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Peer addresses allowed to transfer objects; empty admits everyone.
    #[serde(default)]
    pub allow: Vec<IpAddr>,

    #[serde(default, rename = "realm")]
    pub realms: Vec<RealmConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    #[default]
    File,
    Script,
    Hybrid,
}

/// One `[[realm]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealmConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub options: Vec<RealmOption>,

    /// File of `user:password` lines.
    pub credentials: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RealmOption {
    UserId,
    FullAccess,
}

fn default_listen() -> SocketAddr {
    ([0, 0, 0, 0], 650).into()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_mtu() -> u16 {
    DEFAULT_MTU
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root: default_root(),
            backend: BackendChoice::default(),
            helper: None,
            ftp: default_true(),
            push: default_true(),
            mtu: default_mtu(),
            allow: Vec::new(),
            realms: Vec::new(),
        }
    }
}

impl Config {
    /// Loads `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration read");
        Ok(config)
    }

    pub fn services(&self) -> anyhow::Result<Services> {
        let mut services = Services::empty();
        services.set(Services::OBJECT_PUSH, self.push);
        services.set(Services::FILE_TRANSFER, self.ftp);
        anyhow::ensure!(!services.is_empty(), "both ftp and push are disabled");
        Ok(services)
    }

    pub fn backend_kind(&self) -> anyhow::Result<BackendKind> {
        Ok(match self.backend {
            BackendChoice::File => BackendKind::File,
            BackendChoice::Script => {
                let helper = self
                    .helper
                    .clone()
                    .context("the script backend needs a helper program")?;
                BackendKind::Script { helper }
            }
            BackendChoice::Hybrid => BackendKind::Hybrid {
                helper: self.helper.clone(),
            },
        })
    }

    /// Builds the realms, reading each credentials file.
    pub fn realms(&self) -> anyhow::Result<Vec<Realm>> {
        self.realms
            .iter()
            .map(|realm| {
                let credentials = Credentials::load(&realm.credentials).with_context(|| {
                    format!("cannot load credentials {}", realm.credentials.display())
                })?;
                let options = realm
                    .options
                    .iter()
                    .fold(ChallengeOptions::empty(), |acc, option| {
                        acc | match option {
                            RealmOption::UserId => ChallengeOptions::USER_ID,
                            RealmOption::FullAccess => ChallengeOptions::FULL_ACCESS,
                        }
                    });
                Ok(Realm::new(realm.name.clone(), options, Arc::new(credentials)))
            })
            .collect()
    }

    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let storage = StorageConfig::new(&self.root, self.backend_kind()?)
            .with_folder_browsing(self.ftp)
            .into_factory();
        let mut engine = EngineConfig::new(storage)
            .with_services(self.services()?)
            .with_mtu(self.mtu)
            .with_realms(self.realms()?)?;
        if !self.allow.is_empty() {
            engine = engine.with_access(Arc::new(AllowList::new(self.allow.iter().copied())));
        }
        Ok(engine)
    }
}
