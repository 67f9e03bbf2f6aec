// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node Configuration Renderer
//!
//! Produces the fully-resolved [`NodeSpec`] of one node from a resolved
//! topology. Rendering is a pure function of `(topology, role, index)`:
//! addresses come from blocks fixed at resolution time, and sibling or
//! dependency addresses are derived from the same topology, so every node
//! of a group sees the complete peer set before any of them is created.
//!
//! # Variables
//!
//! | Scope          | Keys                                                         |
//! |----------------|--------------------------------------------------------------|
//! | every node     | identity, addressing, versions, resources, ssh keys, TLS paths |
//! | dependencies   | `{role}_addresses` for every role in `depends_on`            |
//! | quorum-store   | `quorum_peers`, `quorum_initial_cluster_token`, ports        |
//! | control-plane  | `quorum_endpoints`, `control_plane_peers`, API server        |
//! | load-balancer  | `upstream_addresses`, `listen_port`                          |
//! | worker         | `apiserver_endpoint`                                         |
//! | bastion        | `ssh_allowed_subnet`                                         |

pub mod variables;

pub use variables::Variables;

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::domain::{Hostname, NodeRole, ResourceProfile};
use crate::errors::{RenderError, RenderResult};
use crate::topology::{node_id, ClusterTopology, NodeGroup};

/// Client port of quorum-store members
pub const QUORUM_CLIENT_PORT: u16 = 2379;
/// Peer port of quorum-store members
pub const QUORUM_PEER_PORT: u16 = 2380;
/// Kubernetes API server port
pub const APISERVER_PORT: u16 = 6443;

const ETCD_TLS_DIR: &str = "/etc/etcd/tls";
const KUBERNETES_TLS_DIR: &str = "/etc/kubernetes/tls";

/// Fully-resolved configuration of one node
///
/// Never persisted; recomputed from the topology on every run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeSpec {
    /// `{role}-{index}`
    pub id: String,
    /// DNS hostname
    pub hostname: Hostname,
    /// Node role
    pub role: NodeRole,
    /// Index within the group
    pub index: u32,
    /// IPv4 address
    pub address: Ipv4Addr,
    /// CPU and memory
    pub resources: ResourceProfile,
    /// Variables handed to the boot configuration compiler
    pub variables: Variables,
}

/// Render the `index`-th node of a role
pub fn render(topology: &ClusterTopology, role: NodeRole, index: u32) -> RenderResult<NodeSpec> {
    let group = topology.group(role).ok_or(RenderError::UnknownGroup(role))?;
    if index >= group.count {
        return Err(RenderError::IndexOutOfRange {
            role,
            index,
            count: group.count,
        });
    }
    let address = topology
        .address_of(role, index)
        .ok_or(RenderError::AddressOutOfRange { role, index })?;

    let id = node_id(role, index);
    let hostname = hostname_of(topology, role, index)?;
    let variables = node_variables(topology, group, index, &id, &hostname, address)?;

    Ok(NodeSpec {
        id,
        hostname,
        role,
        index,
        address,
        resources: group.resources,
        variables,
    })
}

/// Render every node of a group, in index order
pub fn render_group(topology: &ClusterTopology, role: NodeRole) -> RenderResult<Vec<NodeSpec>> {
    let group = topology.group(role).ok_or(RenderError::UnknownGroup(role))?;
    (0..group.count)
        .map(|index| render(topology, role, index))
        .collect()
}

/// Render every node of the topology, groups in creation order
pub fn render_cluster(topology: &ClusterTopology) -> RenderResult<Vec<NodeSpec>> {
    let mut specs = Vec::with_capacity(topology.total_nodes() as usize);
    for group in topology.groups() {
        specs.extend(render_group(topology, group.role)?);
    }
    Ok(specs)
}

fn hostname_of(topology: &ClusterTopology, role: NodeRole, index: u32) -> RenderResult<Hostname> {
    Ok(Hostname::for_node(
        &node_id(role, index),
        topology.settings().domain.as_deref(),
    )?)
}

fn node_variables(
    topology: &ClusterTopology,
    group: &NodeGroup,
    index: u32,
    id: &str,
    hostname: &Hostname,
    address: Ipv4Addr,
) -> RenderResult<Variables> {
    let settings = topology.settings();
    let network = topology.network();
    let mut vars = Variables::new();

    vars.insert("cluster_name", &settings.name);
    vars.insert("node_id", id);
    vars.insert("hostname", hostname);
    vars.insert("role", group.role);
    vars.insert("index", index);
    vars.insert("group_size", group.count);
    vars.insert("address", address);
    vars.insert("prefix_length", network.prefix_length());
    vars.insert("gateway", network.gateway());
    vars.insert("subnet", network.subnet());
    vars.insert("provider", topology.provider());
    vars.insert("kubernetes_version", &settings.kubernetes_version);
    vars.insert("operating_system_version", &settings.operating_system_version);
    vars.insert("etcd_version", &settings.etcd_version);
    vars.insert("cni_plugins_version", &settings.cni_plugins_version);
    vars.insert("cpus", group.resources.cpus);
    vars.insert("memory_mib", group.resources.memory_mib);
    vars.insert("ssh_authorized_keys", settings.ssh_keys.join("\n"));

    let (ca, certificate, key) = certificate_paths(group.role, id);
    vars.insert("tls_ca_certificate", ca);
    vars.insert("tls_certificate", certificate);
    vars.insert("tls_private_key", key);

    for dependency in &group.depends_on {
        vars.insert_list(
            format!("{}_addresses", dependency.as_key()),
            topology.addresses_of(*dependency),
        );
    }

    match group.role {
        NodeRole::QuorumStore => {
            let mut peers = Vec::with_capacity(group.count as usize);
            for (sibling, peer_address) in topology.addresses_of(group.role).into_iter().enumerate() {
                let sibling = hostname_of(topology, group.role, sibling as u32)?;
                peers.push(format!("{}=https://{}:{}", sibling, peer_address, QUORUM_PEER_PORT));
            }
            vars.insert_list("quorum_peers", peers);
            vars.insert(
                "quorum_initial_cluster_token",
                format!("{}-quorum-store", settings.name),
            );
            vars.insert("quorum_client_port", QUORUM_CLIENT_PORT);
            vars.insert("quorum_peer_port", QUORUM_PEER_PORT);
        }
        NodeRole::ControlPlane => {
            if topology.group(NodeRole::QuorumStore).is_some() {
                vars.insert_list(
                    "quorum_endpoints",
                    topology
                        .addresses_of(NodeRole::QuorumStore)
                        .into_iter()
                        .map(|a| format!("https://{}:{}", a, QUORUM_CLIENT_PORT)),
                );
            }
            vars.insert_list("control_plane_peers", topology.addresses_of(group.role));
            vars.insert("apiserver_advertise_address", address);
            vars.insert("apiserver_port", APISERVER_PORT);
        }
        NodeRole::LoadBalancer => {
            vars.insert_list(
                "upstream_addresses",
                topology
                    .addresses_of(NodeRole::ControlPlane)
                    .into_iter()
                    .map(|a| format!("{}:{}", a, APISERVER_PORT)),
            );
            vars.insert("listen_port", APISERVER_PORT);
        }
        NodeRole::Worker => {
            let endpoint = topology
                .address_of(NodeRole::LoadBalancer, 0)
                .or_else(|| topology.address_of(NodeRole::ControlPlane, 0));
            if let Some(endpoint) = endpoint {
                vars.insert(
                    "apiserver_endpoint",
                    format!("https://{}:{}", endpoint, APISERVER_PORT),
                );
            }
        }
        NodeRole::Bastion => {
            vars.insert("ssh_allowed_subnet", network.subnet());
        }
        NodeRole::Storage => {}
    }

    Ok(vars)
}

/// CA, certificate and key paths a node's boot configuration refers to
///
/// The material itself is provisioned outside this crate.
fn certificate_paths(role: NodeRole, id: &str) -> (String, String, String) {
    match role {
        NodeRole::QuorumStore => (
            format!("{}/etcd_ca.pem", ETCD_TLS_DIR),
            format!("{}/etcd_server.pem", ETCD_TLS_DIR),
            format!("{}/etcd_server.key", ETCD_TLS_DIR),
        ),
        NodeRole::ControlPlane => (
            format!("{}/kubernetes_ca.pem", KUBERNETES_TLS_DIR),
            format!("{}/kube_apiserver.pem", KUBERNETES_TLS_DIR),
            format!("{}/kube_apiserver.key", KUBERNETES_TLS_DIR),
        ),
        _ => (
            format!("{}/kubernetes_ca.pem", KUBERNETES_TLS_DIR),
            format!("{}/{}.pem", KUBERNETES_TLS_DIR, id),
            format!("{}/{}.key", KUBERNETES_TLS_DIR, id),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::topology::resolve;

    fn topology(groups: &str) -> ClusterTopology {
        let config = ClusterConfig::from_yaml_str(&format!(
            "name: lab\nprovider: simulated\ndomain: lab.example\nnetwork:\n  subnet: 10.13.13.0/24\nnode_groups:\n{groups}"
        ))
        .unwrap();
        resolve(&config).unwrap()
    }

    #[test]
    fn test_quorum_peers_list_every_sibling() {
        let topology = topology("  - role: quorum-store\n    count: 3\n");
        let spec = render(&topology, NodeRole::QuorumStore, 1).unwrap();

        assert_eq!(spec.id, "quorum-store-1");
        assert_eq!(spec.hostname.as_str(), "quorum-store-1.lab.example");
        assert_eq!(
            spec.variables.list("quorum_peers"),
            vec![
                "quorum-store-0.lab.example=https://10.13.13.2:2380",
                "quorum-store-1.lab.example=https://10.13.13.3:2380",
                "quorum-store-2.lab.example=https://10.13.13.4:2380",
            ]
        );
        assert_eq!(
            spec.variables.get("quorum_initial_cluster_token"),
            Some("lab-quorum-store")
        );
    }

    #[test]
    fn test_worker_prefers_load_balancer_endpoint() {
        let topology = topology(
            "  - role: control-plane\n    count: 2\n  - role: load-balancer\n    count: 1\n  - role: worker\n    count: 1\n",
        );
        let spec = render(&topology, NodeRole::Worker, 0).unwrap();
        let lb = topology.address_of(NodeRole::LoadBalancer, 0).unwrap();
        assert_eq!(
            spec.variables.get("apiserver_endpoint"),
            Some(format!("https://{}:6443", lb).as_str())
        );
        assert_eq!(
            spec.variables.list("control_plane_addresses").len(),
            2
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let topology = topology("  - role: worker\n    count: 1\n");
        assert_eq!(
            render(&topology, NodeRole::Worker, 1),
            Err(RenderError::IndexOutOfRange {
                role: NodeRole::Worker,
                index: 1,
                count: 1,
            })
        );
        assert_eq!(
            render(&topology, NodeRole::Bastion, 0),
            Err(RenderError::UnknownGroup(NodeRole::Bastion))
        );
    }

    #[test]
    fn test_common_variables() {
        let topology = topology("  - role: bastion\n    count: 1\n");
        let spec = render(&topology, NodeRole::Bastion, 0).unwrap();
        assert_eq!(spec.variables.get("gateway"), Some("10.13.13.1"));
        assert_eq!(spec.variables.get("prefix_length"), Some("24"));
        assert_eq!(spec.variables.get("provider"), Some("simulated"));
        assert_eq!(spec.variables.get("ssh_allowed_subnet"), Some("10.13.13.0/24"));
        assert_eq!(
            spec.variables.get("tls_certificate"),
            Some("/etc/kubernetes/tls/bastion-0.pem")
        );
    }
}
