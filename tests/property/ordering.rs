// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Creation Order

use cim_cluster::config::{ClusterConfig, NodeGroupConfig};
use cim_cluster::domain::NodeRole;
use cim_cluster::topology;
use cim_cluster::ConfigError;
use proptest::prelude::*;

/// Roles in a random declaration order, each depending on a random subset
/// of the roles before it in a random rank order (always acyclic)
fn arb_dag() -> impl Strategy<Value = Vec<(NodeRole, Vec<NodeRole>)>> {
    (
        Just(NodeRole::ALL.to_vec()).prop_shuffle(),
        proptest::collection::vec(any::<u8>(), NodeRole::ALL.len()),
    )
        .prop_flat_map(|(ranked, masks)| {
            let groups: Vec<(NodeRole, Vec<NodeRole>)> = ranked
                .iter()
                .enumerate()
                .map(|(rank, role)| {
                    let deps = ranked[..rank]
                        .iter()
                        .enumerate()
                        .filter(|(bit, _)| masks[rank] & (1 << bit) != 0)
                        .map(|(_, dep)| *dep)
                        .collect();
                    (*role, deps)
                })
                .collect();
            Just(groups).prop_shuffle()
        })
}

fn document(groups: &[(NodeRole, Vec<NodeRole>)]) -> ClusterConfig {
    let mut config = ClusterConfig::from_yaml_str(
        "provider: simulated\nnetwork:\n  subnet: 10.30.0.0/24\nnode_groups: []\n",
    )
    .unwrap();
    config.node_groups = groups
        .iter()
        .map(|(role, deps)| NodeGroupConfig {
            role: role.as_str().to_string(),
            count: 1,
            resources: None,
            depends_on: Some(deps.iter().map(|d| d.as_str().to_string()).collect()),
            address_offset: None,
        })
        .collect();
    config
}

proptest! {
    #[test]
    fn prop_creation_order_is_topological(groups in arb_dag()) {
        let topology = topology::resolve(&document(&groups)).unwrap();
        let order = topology.creation_order();
        prop_assert_eq!(order.len(), groups.len());

        let position = |role: NodeRole| order.iter().position(|r| *r == role).unwrap();
        for (role, deps) in &groups {
            for dep in deps {
                prop_assert!(position(*dep) < position(*role), "{} before {}", role, dep);
            }
        }

        let mut reversed = order.clone();
        reversed.reverse();
        prop_assert_eq!(topology.deletion_order(), reversed);
    }

    #[test]
    fn prop_back_edge_is_a_cycle(groups in arb_dag()) {
        // Find any edge a → b and add b → a
        let edge = groups
            .iter()
            .find_map(|(role, deps)| deps.first().map(|dep| (*role, *dep)));
        prop_assume!(edge.is_some());
        let (dependent, dependency) = edge.unwrap();

        let mut cyclic = groups.clone();
        for (role, deps) in cyclic.iter_mut() {
            if *role == dependency {
                deps.push(dependent);
            }
        }

        let result = topology::resolve(&document(&cyclic));
        prop_assert!(
            matches!(&result, Err(ConfigError::DependencyCycle { roles })
                if roles.contains(&dependent) && roles.contains(&dependency)),
            "expected a cycle, got {:?}",
            result.map(|t| t.creation_order())
        );
    }
}
