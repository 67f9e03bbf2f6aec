// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-cluster
//!
//! Deterministic topology documents shared by the integration tests.
//!
//! # Design Principles
//! - Documents are constants; tests never build YAML ad hoc
//! - Fixtures resolve through the public API only
//! - Every provider here is the in-memory driver

#![allow(dead_code)]

use std::sync::Arc;

use cim_cluster::compiler::JsonCompiler;
use cim_cluster::events::RecordingSink;
use cim_cluster::provider::InMemoryProvider;
use cim_cluster::topology::{self, ClusterTopology};
use cim_cluster::{ClusterConfig, Orchestrator};

/// 1 storage, 3 quorum-store, 1 load-balancer, 3 control-plane, 0 workers
pub const E2E_CLUSTER: &str = r#"
name: kx
provider: simulated
ssh_keys:
  - ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFixtureOperatorKey operator@example
network:
  subnet: 10.13.13.0/24
node_groups:
  - role: storage
    count: 1
  - role: quorum-store
    count: 3
  - role: load-balancer
    count: 1
  - role: control-plane
    count: 3
  - role: worker
    count: 0
"#;

/// Full cluster with workers behind the load balancer
pub const WORKER_CLUSTER: &str = r#"
name: lab
provider: simulated
domain: lab.example
network:
  subnet: 192.168.50.0/24
node_groups:
  - role: quorum-store
    count: 3
  - role: control-plane
    count: 2
  - role: load-balancer
    count: 1
  - role: worker
    count: 4
    resources: { cpus: 4, memory_mib: 8192 }
"#;

/// Parse a fixture document
pub fn config(document: &str) -> ClusterConfig {
    ClusterConfig::from_yaml_str(document).expect("fixture document must parse")
}

/// Resolve a fixture document
pub fn resolved(document: &str) -> ClusterTopology {
    topology::resolve(&config(document)).expect("fixture document must resolve")
}

/// The end-to-end topology
pub fn e2e_topology() -> ClusterTopology {
    resolved(E2E_CLUSTER)
}

/// Orchestrator over `provider` that records every lifecycle event
pub fn orchestrator(
    topology: ClusterTopology,
    provider: Arc<InMemoryProvider>,
) -> (Orchestrator, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let orchestrator =
        Orchestrator::new(topology, provider, Arc::new(JsonCompiler)).with_sink(sink.clone());
    (orchestrator, sink)
}
