// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provider Abstraction
//!
//! The only outward-facing side-effect boundary of the crate. Each backend
//! implements [`Provider`] once and is selected by [`build`] when the
//! orchestrator is constructed; nothing above this line branches on which
//! backend is in use.
//!
//! # Contract
//!
//! - `prepare` is idempotent and skips work already done
//! - `create` either resumes a partial attempt or fails with
//!   [`ProviderError::Conflict`], never duplicates a machine
//! - `destroy` of an absent node succeeds
//! - `clean` removes what `prepare` produced and is idempotent
//! - no call assumes ordering relative to other nodes
//! - every call bounds its own run time
//!
//! [`ProviderError::Conflict`]: crate::errors::ProviderError::Conflict

pub mod memory;
pub mod vagrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::compiler::BootConfig;
use crate::config::ClusterSettings;
use crate::errors::{ConfigError, ProviderResult};
use crate::render::NodeSpec;

pub use memory::{InMemoryProvider, ProviderCall};
pub use vagrant::VagrantConfig;
#[cfg(feature = "vagrant")]
pub use vagrant::VagrantProvider;

/// Infrastructure backend selected by the configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Local libvirt machines managed through Vagrant
    Vagrant,
    /// In-process reference driver
    Simulated,
}

impl ProviderKind {
    /// Canonical tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vagrant => "vagrant",
            Self::Simulated => "simulated",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vagrant" => Ok(Self::Vagrant),
            "simulated" | "memory" | "in-memory" => Ok(Self::Simulated),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

/// Provider-side reference to a created node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Node id (`{role}-{index}`)
    pub id: String,
}

impl NodeHandle {
    /// Handle for a node id
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Capability interface implemented once per backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend identity, for logs and reports
    fn kind(&self) -> ProviderKind;

    /// Prepare provider-level artifacts (base images, packaging)
    async fn prepare(&self) -> ProviderResult<()>;

    /// Create one machine booting `boot_config`
    async fn create(&self, node: &NodeSpec, boot_config: &BootConfig) -> ProviderResult<NodeHandle>;

    /// Destroy one machine; absent machines are a success
    async fn destroy(&self, handle: &NodeHandle) -> ProviderResult<()>;

    /// Remove everything `prepare` produced
    async fn clean(&self) -> ProviderResult<()>;
}

/// Backend-specific knobs handed to [`build`]
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Vagrant driver settings
    pub vagrant: VagrantConfig,
}

/// Construct the provider strategy for a backend
pub fn build(
    kind: ProviderKind,
    settings: &ClusterSettings,
    options: ProviderOptions,
) -> Result<Arc<dyn Provider>, ConfigError> {
    match kind {
        ProviderKind::Simulated => Ok(Arc::new(InMemoryProvider::new())),
        ProviderKind::Vagrant => build_vagrant(settings, options),
    }
}

#[cfg(feature = "vagrant")]
fn build_vagrant(
    settings: &ClusterSettings,
    options: ProviderOptions,
) -> Result<Arc<dyn Provider>, ConfigError> {
    Ok(Arc::new(VagrantProvider::new(options.vagrant, settings)))
}

#[cfg(not(feature = "vagrant"))]
fn build_vagrant(
    _settings: &ClusterSettings,
    _options: ProviderOptions,
) -> Result<Arc<dyn Provider>, ConfigError> {
    Err(ConfigError::ProviderUnavailable(
        ProviderKind::Vagrant.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_tags() {
        assert_eq!("Vagrant".parse::<ProviderKind>(), Ok(ProviderKind::Vagrant));
        assert_eq!(
            "simulated".parse::<ProviderKind>(),
            Ok(ProviderKind::Simulated)
        );
        assert_eq!(
            "aws".parse::<ProviderKind>(),
            Err(ConfigError::UnknownProvider("aws".to_string()))
        );
    }

    #[test]
    fn test_build_simulated() {
        let config = crate::config::ClusterConfig::from_yaml_str(
            "provider: simulated\nnetwork: { subnet: 10.0.0.0/24 }\nnode_groups: []\n",
        )
        .unwrap();
        let settings = ClusterSettings::from_config(&config).unwrap();
        let provider = build(ProviderKind::Simulated, &settings, ProviderOptions::default()).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Simulated);
    }
}
