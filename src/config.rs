// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster configuration document
//!
//! The document is the only input of topology resolution. It is parsed
//! as-is into [`ClusterConfig`]; nothing here is trusted until
//! [`crate::topology::resolve`] has validated it.
//!
//! ```yaml
//! name: kx
//! provider: vagrant
//! ssh_keys:
//!   - ssh-ed25519 AAAA... operator@example
//! network:
//!   subnet: 10.13.13.0/24
//! node_groups:
//!   - role: storage
//!     count: 1
//!   - role: quorum-store
//!     count: 3
//!   - role: control-plane
//!     count: 3
//!     resources: { cpus: 2, memory_mib: 2048 }
//! ```

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::domain::{Hostname, ResourceProfile};
use crate::errors::{ConfigError, ConfigResult};

/// Fedora CoreOS release booted on every node
pub const DEFAULT_OPERATING_SYSTEM_VERSION: &str = "31.20200323.3.2";
/// Kubernetes release installed by the bootstrap units
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.18.1";
/// etcd release run by quorum-store nodes
pub const DEFAULT_ETCD_VERSION: &str = "3.4.7";
/// CNI plugins release
pub const DEFAULT_CNI_PLUGINS_VERSION: &str = "0.8.5";

fn default_name() -> String {
    "kx".to_string()
}

fn default_operating_system_version() -> String {
    DEFAULT_OPERATING_SYSTEM_VERSION.to_string()
}

fn default_kubernetes_version() -> String {
    DEFAULT_KUBERNETES_VERSION.to_string()
}

fn default_etcd_version() -> String {
    DEFAULT_ETCD_VERSION.to_string()
}

fn default_cni_plugins_version() -> String {
    DEFAULT_CNI_PLUGINS_VERSION.to_string()
}

fn default_one() -> u32 {
    1
}

/// Raw cluster configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Cluster name, used in hostnames and tokens
    #[serde(default = "default_name")]
    pub name: String,

    /// Infrastructure provider tag
    pub provider: String,

    /// Fedora CoreOS version
    #[serde(default = "default_operating_system_version")]
    pub operating_system_version: String,

    /// Kubernetes version
    #[serde(default = "default_kubernetes_version")]
    pub kubernetes_version: String,

    /// etcd version
    #[serde(default = "default_etcd_version")]
    pub etcd_version: String,

    /// CNI plugins version
    #[serde(default = "default_cni_plugins_version")]
    pub cni_plugins_version: String,

    /// Optional DNS domain appended to node hostnames
    #[serde(default)]
    pub domain: Option<String>,

    /// SSH public keys authorized for the `core` user
    #[serde(default)]
    pub ssh_keys: Vec<String>,

    /// Addressing scheme
    pub network: NetworkConfig,

    /// Node groups in declaration order
    pub node_groups: Vec<NodeGroupConfig>,
}

/// Raw network section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Base subnet in CIDR notation
    pub subnet: String,

    /// Addresses after the network address kept for the provider (gateway)
    #[serde(default = "default_one")]
    pub reserved_addresses: u32,

    /// Addresses each node consumes
    #[serde(default = "default_one")]
    pub addresses_per_node: u32,
}

/// Raw node group section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeGroupConfig {
    /// Role name
    pub role: String,

    /// Number of nodes; signed so negative values are reported, not rejected by the parser
    pub count: i64,

    /// Per-node resources
    #[serde(default)]
    pub resources: Option<ResourceProfile>,

    /// Roles that must be fully created first; role defaults apply when absent
    #[serde(default)]
    pub depends_on: Option<Vec<String>>,

    /// Pinned start offset of this group's address block
    #[serde(default)]
    pub address_offset: Option<u32>,
}

impl ClusterConfig {
    /// Parse a YAML (or JSON) document
    pub fn from_yaml_str(document: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Parse a document from a reader
    pub fn from_reader(reader: impl Read) -> ConfigResult<Self> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Load and parse a document from disk
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("Loading cluster configuration from {}", path.display());
        let file = std::fs::File::open(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

/// Cluster-wide settings threaded through render, compile and create
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Cluster name
    pub name: String,
    /// Fedora CoreOS version
    pub operating_system_version: String,
    /// Kubernetes version
    pub kubernetes_version: String,
    /// etcd version
    pub etcd_version: String,
    /// CNI plugins version
    pub cni_plugins_version: String,
    /// Optional hostname domain
    pub domain: Option<String>,
    /// Authorized SSH public keys
    pub ssh_keys: Vec<String>,
}

impl ClusterSettings {
    /// Validate the settings part of a document
    pub fn from_config(config: &ClusterConfig) -> ConfigResult<Self> {
        Hostname::new(&config.name)?;
        if config.name.contains('.') {
            return Err(ConfigError::Parse(format!(
                "cluster name '{}' must be a single DNS label",
                config.name
            )));
        }

        for (field, value) in [
            ("operating_system_version", &config.operating_system_version),
            ("kubernetes_version", &config.kubernetes_version),
            ("etcd_version", &config.etcd_version),
            ("cni_plugins_version", &config.cni_plugins_version),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptySetting(field));
            }
        }

        let domain = match config.domain.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(domain) => Some(Hostname::new(domain)?.as_str().to_string()),
        };

        for (index, key) in config.ssh_keys.iter().enumerate() {
            if !looks_like_public_key(key) {
                return Err(ConfigError::InvalidSshKey { index });
            }
        }

        Ok(Self {
            name: config.name.to_lowercase(),
            operating_system_version: config.operating_system_version.trim().to_string(),
            kubernetes_version: config.kubernetes_version.trim().to_string(),
            etcd_version: config.etcd_version.trim().to_string(),
            cni_plugins_version: config.cni_plugins_version.trim().to_string(),
            domain,
            ssh_keys: config.ssh_keys.iter().map(|k| k.trim().to_string()).collect(),
        })
    }
}

fn looks_like_public_key(key: &str) -> bool {
    let mut parts = key.split_whitespace();
    let (Some(kind), Some(material)) = (parts.next(), parts.next()) else {
        return false;
    };
    let known_kind = kind.starts_with("ssh-")
        || kind.starts_with("ecdsa-")
        || kind.starts_with("sk-");
    known_kind && material.len() >= 16
}
