// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Create Outcomes

use cim_cluster::compiler::JsonCompiler;
use cim_cluster::domain::NodeRole;
use cim_cluster::orchestrator::GroupStatus;
use cim_cluster::provider::InMemoryProvider;
use cim_cluster::state_machine::{NodeStatus, RunState};
use cim_cluster::{topology, ClusterConfig, Orchestrator};
use proptest::prelude::*;
use std::sync::Arc;

const CLUSTER: &str = r#"
provider: simulated
network:
  subnet: 10.40.0.0/24
node_groups:
  - role: storage
    count: 1
  - role: quorum-store
    count: 3
  - role: load-balancer
    count: 1
  - role: control-plane
    count: 2
  - role: worker
    count: 2
"#;

const NODE_IDS: [&str; 9] = [
    "storage-0",
    "quorum-store-0",
    "quorum-store-1",
    "quorum-store-2",
    "load-balancer-0",
    "control-plane-0",
    "control-plane-1",
    "worker-0",
    "worker-1",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_failures_never_leak_into_dependents(
        failing in proptest::sample::subsequence(NODE_IDS.to_vec(), 0..=NODE_IDS.len())
    ) {
        let topology = topology::resolve(&ClusterConfig::from_yaml_str(CLUSTER).unwrap()).unwrap();
        let provider = Arc::new(InMemoryProvider::new().failing_create(failing.clone()));
        let orchestrator = Orchestrator::new(topology.clone(), provider, Arc::new(JsonCompiler));

        let report = tokio_test::block_on(orchestrator.create_cluster());

        prop_assert_eq!(report.nodes.len(), NODE_IDS.len());
        prop_assert!(report.nodes.iter().all(|n| n.status != NodeStatus::Pending));
        prop_assert_eq!(report.outcome == RunState::Succeeded, failing.is_empty());

        for id in &failing {
            let status = report.node_status(id).unwrap();
            prop_assert!(
                matches!(status, NodeStatus::Failed | NodeStatus::Skipped(_)),
                "{} is {}", id, status
            );
        }

        // A created node never sits in a group whose dependency is incomplete
        for node in report.nodes.iter().filter(|n| n.status == NodeStatus::Created) {
            for dependency in &topology.group(node.role).unwrap().depends_on {
                prop_assert_eq!(report.group_status(*dependency), Some(GroupStatus::Succeeded));
            }
        }

        // Independent groups are only affected by their own failures
        let lb_failed = failing.contains(&"load-balancer-0");
        prop_assert_eq!(
            report.group_status(NodeRole::LoadBalancer),
            Some(if lb_failed { GroupStatus::Failed } else { GroupStatus::Succeeded })
        );
    }
}
