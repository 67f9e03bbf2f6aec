// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node Role Domain Model
//!
//! Defines the roles a machine can play in a cluster and the resources a
//! node of a role is provisioned with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Role played by every node of a node group
///
/// A topology holds at most one group per role, so a role also names its
/// group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// Addressing and storage services
    Storage,
    /// Member of a fixed-size consensus peer set (etcd)
    QuorumStore,
    /// Kubernetes control plane (API server, scheduler, controller manager)
    ControlPlane,
    /// Front door for the control plane
    LoadBalancer,
    /// Kubernetes worker
    Worker,
    /// SSH jump host
    Bastion,
}

impl NodeRole {
    /// Every role, in declaration order
    pub const ALL: [NodeRole; 6] = [
        NodeRole::Storage,
        NodeRole::QuorumStore,
        NodeRole::ControlPlane,
        NodeRole::LoadBalancer,
        NodeRole::Worker,
        NodeRole::Bastion,
    ];

    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::QuorumStore => "quorum-store",
            Self::ControlPlane => "control-plane",
            Self::LoadBalancer => "load-balancer",
            Self::Worker => "worker",
            Self::Bastion => "bastion",
        }
    }

    /// Identifier form usable as a variable key prefix
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::QuorumStore => "quorum_store",
            Self::ControlPlane => "control_plane",
            Self::LoadBalancer => "load_balancer",
            Self::Worker => "worker",
            Self::Bastion => "bastion",
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Storage => "Storage",
            Self::QuorumStore => "Quorum Store",
            Self::ControlPlane => "Control Plane",
            Self::LoadBalancer => "Load Balancer",
            Self::Worker => "Worker",
            Self::Bastion => "Bastion",
        }
    }

    /// Roles a group of this role waits for when its configuration does not
    /// declare `depends_on`
    pub fn default_dependencies(&self) -> &'static [NodeRole] {
        match self {
            Self::QuorumStore => &[NodeRole::Storage],
            Self::ControlPlane => &[NodeRole::QuorumStore],
            Self::Worker => &[NodeRole::ControlPlane],
            Self::Storage | Self::LoadBalancer | Self::Bastion => &[],
        }
    }

    /// Position of this role's address block when blocks are packed
    ///
    /// Quorum-store and control-plane addresses end up in certificates and
    /// peer lists, so they take the low, stable part of the subnet.
    pub fn address_rank(&self) -> u8 {
        match self {
            Self::QuorumStore => 0,
            Self::LoadBalancer => 1,
            Self::ControlPlane => 2,
            Self::Worker => 3,
            Self::Bastion => 4,
            Self::Storage => 5,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "storage" => Ok(Self::Storage),
            "quorum-store" | "quorum" | "etcd" => Ok(Self::QuorumStore),
            "control-plane" | "master" | "controller" => Ok(Self::ControlPlane),
            "load-balancer" | "lb" | "balancer" => Ok(Self::LoadBalancer),
            "worker" | "node" => Ok(Self::Worker),
            "bastion" | "jump" => Ok(Self::Bastion),
            _ => Err(ConfigError::UnknownRole(s.to_string())),
        }
    }
}

/// CPU and memory allocated to each node of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Virtual CPUs
    pub cpus: u32,
    /// Memory in MiB
    pub memory_mib: u32,
}

impl ResourceProfile {
    /// Create a new profile
    pub fn new(cpus: u32, memory_mib: u32) -> Self {
        Self { cpus, memory_mib }
    }

    /// Profile used when a group does not declare one
    pub fn default_for(role: NodeRole) -> Self {
        match role {
            NodeRole::ControlPlane => Self::new(2, 2048),
            NodeRole::Worker => Self::new(2, 4096),
            NodeRole::QuorumStore | NodeRole::Storage => Self::new(1, 1024),
            NodeRole::LoadBalancer | NodeRole::Bastion => Self::new(1, 512),
        }
    }

    /// Check the profile can actually boot a machine
    pub fn validate(&self, role: NodeRole) -> Result<(), ConfigError> {
        if self.cpus == 0 {
            return Err(ConfigError::InvalidResources {
                role,
                reason: "cpus must be at least 1".to_string(),
            });
        }
        if self.memory_mib < 256 {
            return Err(ConfigError::InvalidResources {
                role,
                reason: format!("memory_mib {} is below 256", self.memory_mib),
            });
        }
        Ok(())
    }
}
