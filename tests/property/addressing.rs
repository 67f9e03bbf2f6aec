// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Address Allocation

use cim_cluster::config::{ClusterConfig, NodeGroupConfig};
use cim_cluster::domain::NodeRole;
use cim_cluster::render;
use cim_cluster::topology;
use cim_cluster::ConfigError;
use proptest::prelude::*;
use std::collections::HashSet;
use std::net::Ipv4Addr;

fn document(prefix: u8, reserved: u32, per_node: u32, counts: &[(NodeRole, i64)]) -> ClusterConfig {
    let mut config = ClusterConfig::from_yaml_str(
        "provider: simulated\nnetwork:\n  subnet: 10.20.0.0/24\nnode_groups: []\n",
    )
    .unwrap();
    config.network.subnet = format!("10.20.0.0/{prefix}");
    config.network.reserved_addresses = reserved;
    config.network.addresses_per_node = per_node;
    config.node_groups = counts
        .iter()
        .map(|(role, count)| NodeGroupConfig {
            role: role.as_str().to_string(),
            count: *count,
            resources: None,
            depends_on: None,
            address_offset: None,
        })
        .collect();
    config
}

/// A subset of roles, each with a count
fn arb_groups() -> impl Strategy<Value = Vec<(NodeRole, i64)>> {
    proptest::sample::subsequence(NodeRole::ALL.to_vec(), 1..=NodeRole::ALL.len())
        .prop_flat_map(|roles| {
            let len = roles.len();
            (Just(roles), proptest::collection::vec(0i64..20, len))
        })
        .prop_map(|(roles, counts)| roles.into_iter().zip(counts).collect())
}

proptest! {
    #[test]
    fn prop_addresses_unique_and_inside_subnet(
        prefix in 24u8..=28,
        reserved in 1u32..=3,
        per_node in 1u32..=3,
        groups in arb_groups(),
    ) {
        let config = document(prefix, reserved, per_node, &groups);
        let total: u64 = groups.iter().map(|(_, c)| *c as u64).sum();
        let usable = (1u64 << (32 - u32::from(prefix))) - 2 - u64::from(reserved);

        match topology::resolve(&config) {
            Ok(topology) => {
                prop_assert!(total > 0);
                prop_assert!(total * u64::from(per_node) <= usable);

                let specs = render::render_cluster(&topology).unwrap();
                prop_assert_eq!(specs.len() as u64, total);

                let subnet = topology.network().subnet();
                let first_usable = u32::from(subnet.network()) + 1 + reserved;
                let mut seen = HashSet::new();
                for spec in &specs {
                    prop_assert!(subnet.contains(&spec.address));
                    prop_assert!(u32::from(spec.address) >= first_usable);
                    prop_assert!(spec.address != subnet.broadcast());
                    prop_assert!(seen.insert(spec.address), "duplicate {}", spec.address);
                }
            }
            Err(ConfigError::EmptyTopology) => prop_assert_eq!(total, 0),
            Err(ConfigError::SubnetOverflow { required, usable: reported, .. }) => {
                prop_assert_eq!(required, total * u64::from(per_node));
                prop_assert_eq!(reported, usable);
                prop_assert!(required > usable);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    #[test]
    fn prop_addressing_is_deterministic(groups in arb_groups()) {
        let config = document(24, 1, 1, &groups);
        if let (Ok(first), Ok(second)) = (topology::resolve(&config), topology::resolve(&config)) {
            let first: Vec<Ipv4Addr> = render::render_cluster(&first)
                .unwrap()
                .into_iter()
                .map(|spec| spec.address)
                .collect();
            let second: Vec<Ipv4Addr> = render::render_cluster(&second)
                .unwrap()
                .into_iter()
                .map(|spec| spec.address)
                .collect();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn prop_negative_count_is_rejected(count in i64::MIN..0) {
        let config = document(24, 1, 1, &[(NodeRole::Worker, count)]);
        prop_assert_eq!(
            topology::resolve(&config),
            Err(ConfigError::NegativeCount { role: NodeRole::Worker, count })
        );
    }
}
