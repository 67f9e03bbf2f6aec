// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster Topology Model
//!
//! Turns a raw [`ClusterConfig`] into an immutable [`ClusterTopology`]:
//!
//! ```text
//! ClusterConfig ──resolve──► ClusterTopology
//!                              ├── provider    (known tag)
//!                              ├── settings    (versions, keys, domain)
//!                              ├── network     (subnet + allocation rule)
//!                              └── groups      (creation order, address blocks)
//! ```
//!
//! Every check happens here, before any provider is touched. Downstream
//! consumers never re-derive ordering or addressing.

pub mod addressing;
pub mod ordering;

use serde::Serialize;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::config::{ClusterConfig, ClusterSettings};
use crate::domain::{AddressBlock, Hostname, NetworkScheme, NodeRole, ResourceProfile};
use crate::errors::{ConfigError, ConfigResult};
use crate::provider::ProviderKind;

use addressing::{allocate_blocks, BlockRequest};
use ordering::stable_topological_order;

/// Identifier of the `index`-th node of a role
pub fn node_id(role: NodeRole, index: u32) -> String {
    format!("{}-{}", role.as_str(), index)
}

/// All nodes sharing one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeGroup {
    /// Role of every node in the group
    pub role: NodeRole,
    /// Number of nodes
    pub count: u32,
    /// Per-node resources
    pub resources: ResourceProfile,
    /// Roles whose groups must be fully created first
    pub depends_on: BTreeSet<NodeRole>,
    /// Subnet offsets owned by the group
    pub address_block: AddressBlock,
    /// Position in the configuration document
    pub declaration_index: usize,
}

impl NodeGroup {
    /// Node ids of the group, in index order
    pub fn node_ids(&self) -> Vec<String> {
        (0..self.count).map(|index| node_id(self.role, index)).collect()
    }
}

/// Resolved, validated cluster topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTopology {
    provider: ProviderKind,
    settings: ClusterSettings,
    network: NetworkScheme,
    groups: Vec<NodeGroup>,
}

impl ClusterTopology {
    /// Provider selected by the document
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Cluster-wide settings
    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Addressing scheme
    pub fn network(&self) -> &NetworkScheme {
        &self.network
    }

    /// Node groups in creation order
    pub fn groups(&self) -> &[NodeGroup] {
        &self.groups
    }

    /// Group of a role, if declared
    pub fn group(&self, role: NodeRole) -> Option<&NodeGroup> {
        self.groups.iter().find(|group| group.role == role)
    }

    /// Roles in creation order
    pub fn creation_order(&self) -> Vec<NodeRole> {
        self.groups.iter().map(|group| group.role).collect()
    }

    /// Roles in deletion order (reverse of creation)
    pub fn deletion_order(&self) -> Vec<NodeRole> {
        self.groups.iter().rev().map(|group| group.role).collect()
    }

    /// Roles that directly depend on `role`
    pub fn dependents_of(&self, role: NodeRole) -> Vec<NodeRole> {
        self.groups
            .iter()
            .filter(|group| group.depends_on.contains(&role))
            .map(|group| group.role)
            .collect()
    }

    /// Total number of nodes
    pub fn total_nodes(&self) -> u64 {
        self.groups.iter().map(|group| u64::from(group.count)).sum()
    }

    /// Address of the `index`-th node of a role
    pub fn address_of(&self, role: NodeRole, index: u32) -> Option<Ipv4Addr> {
        let group = self.group(role)?;
        if index >= group.count {
            return None;
        }
        let offset = index
            .checked_mul(self.network.addresses_per_node())?
            .checked_add(group.address_block.offset)?;
        self.network.address_at(offset)
    }

    /// Addresses of every node of a role, in index order
    pub fn addresses_of(&self, role: NodeRole) -> Vec<Ipv4Addr> {
        let count = self.group(role).map_or(0, |group| group.count);
        (0..count)
            .filter_map(|index| self.address_of(role, index))
            .collect()
    }
}

/// Validate a configuration document and resolve it into a topology
///
/// # Validation
/// - provider tag is known
/// - settings are non-empty and ssh keys look like public keys
/// - counts are non-negative and the topology holds at least one node
/// - roles are unique and every explicit dependency is declared
/// - the role dependency graph is acyclic
/// - `sum(counts) * addresses_per_node` fits the usable subnet
/// - address blocks stay inside the subnet and never overlap
pub fn resolve(config: &ClusterConfig) -> ConfigResult<ClusterTopology> {
    let provider: ProviderKind = config.provider.parse()?;
    let settings = ClusterSettings::from_config(config)?;
    let network = NetworkScheme::new(
        &config.network.subnet,
        config.network.reserved_addresses,
        config.network.addresses_per_node,
    )?;

    let mut declared: Vec<(NodeRole, u32, ResourceProfile)> = Vec::new();
    for group in &config.node_groups {
        let role: NodeRole = group.role.parse()?;
        if declared.iter().any(|(existing, _, _)| *existing == role) {
            return Err(ConfigError::DuplicateRole(role));
        }
        if group.count < 0 {
            return Err(ConfigError::NegativeCount {
                role,
                count: group.count,
            });
        }
        let count = u32::try_from(group.count).map_err(|_| ConfigError::CountTooLarge {
            role,
            count: group.count,
        })?;
        let resources = group
            .resources
            .unwrap_or_else(|| ResourceProfile::default_for(role));
        resources.validate(role)?;
        declared.push((role, count, resources));
    }

    let total: u64 = declared.iter().map(|(_, count, _)| u64::from(*count)).sum();
    if total == 0 {
        return Err(ConfigError::EmptyTopology);
    }

    let roles: Vec<NodeRole> = declared.iter().map(|(role, _, _)| *role).collect();
    let mut dependencies: Vec<BTreeSet<NodeRole>> = Vec::with_capacity(roles.len());
    for (group, role) in config.node_groups.iter().zip(&roles) {
        let depends_on = match &group.depends_on {
            Some(names) => {
                let mut explicit = BTreeSet::new();
                for name in names {
                    let dependency: NodeRole = name.parse()?;
                    if !roles.contains(&dependency) {
                        return Err(ConfigError::UnknownDependency {
                            role: *role,
                            dependency,
                        });
                    }
                    explicit.insert(dependency);
                }
                explicit
            }
            None => role
                .default_dependencies()
                .iter()
                .copied()
                .filter(|dependency| roles.contains(dependency))
                .collect(),
        };
        dependencies.push(depends_on);
    }

    let edges: Vec<Vec<usize>> = dependencies
        .iter()
        .map(|deps| {
            deps.iter()
                .filter_map(|dep| roles.iter().position(|role| role == dep))
                .collect()
        })
        .collect();
    let order = stable_topological_order(&edges).map_err(|unresolved| {
        ConfigError::DependencyCycle {
            roles: unresolved.into_iter().map(|i| roles[i]).collect(),
        }
    })?;

    let per_node = u64::from(network.addresses_per_node());
    let required = total.saturating_mul(per_node);
    if required > network.usable_count() {
        return Err(ConfigError::SubnetOverflow {
            subnet: network.to_string(),
            required,
            usable: network.usable_count(),
        });
    }

    let requests: Vec<BlockRequest> = config
        .node_groups
        .iter()
        .zip(&declared)
        .map(|(group, (role, count, _))| BlockRequest {
            role: *role,
            // fits: bounded by `required`, which fits the usable range
            len: count * network.addresses_per_node(),
            pinned: group.address_offset,
        })
        .collect();
    let blocks = allocate_blocks(&network, &requests)?;

    for (role, count, _) in &declared {
        if *count > 0 {
            Hostname::for_node(&node_id(*role, count - 1), settings.domain.as_deref())?;
        }
    }

    let groups: Vec<NodeGroup> = order
        .into_iter()
        .map(|index| {
            let (role, count, resources) = declared[index];
            NodeGroup {
                role,
                count,
                resources,
                depends_on: dependencies[index].clone(),
                address_block: blocks[index],
                declaration_index: index,
            }
        })
        .collect();

    debug!(
        "Resolved topology '{}' with {} nodes in {} groups",
        settings.name,
        total,
        groups.len()
    );

    Ok(ClusterTopology {
        provider,
        settings,
        network,
        groups,
    })
}
