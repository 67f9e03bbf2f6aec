// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle orchestration scenarios against the in-memory provider

mod fixtures;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use cim_cluster::compiler::BootConfig;
use cim_cluster::domain::NodeRole;
use cim_cluster::events::LifecycleEventKind;
use cim_cluster::orchestrator::{GroupStatus, Operation, OrchestratorConfig};
use cim_cluster::provider::{InMemoryProvider, NodeHandle, Provider, ProviderCall};
use cim_cluster::render;
use cim_cluster::state_machine::{NodeStatus, RunState, SkipReason};
use pretty_assertions::assert_eq;

/// Index of the first and last call touching any node of `role`
fn call_span(calls: &[ProviderCall], role: NodeRole) -> Option<(usize, usize)> {
    let prefix = format!("{}-", role.as_str());
    let positions: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| match call {
            ProviderCall::Create(id) | ProviderCall::Destroy(id) => id.starts_with(&prefix),
            _ => false,
        })
        .map(|(position, _)| position)
        .collect();
    Some((*positions.first()?, *positions.last()?))
}

#[tokio::test]
async fn test_e2e_create_succeeds() {
    let provider = Arc::new(InMemoryProvider::new());
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider.clone());

    let report = orchestrator.create_cluster().await;

    assert_eq!(report.outcome, RunState::Succeeded);
    assert!(report.is_success());
    assert_eq!(report.nodes.len(), 8);
    assert!(report.nodes.iter().all(|n| n.status == NodeStatus::Created));
    assert_eq!(provider.node_ids().await.len(), 8);
}

#[tokio::test]
async fn test_quorum_store_failure_skips_dependents() {
    let provider = Arc::new(InMemoryProvider::new().failing_create(["quorum-store-1"]));
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider.clone());

    let report = orchestrator.create_cluster().await;

    assert_eq!(report.outcome, RunState::PartiallyFailed);
    assert_eq!(report.group_status(NodeRole::Storage), Some(GroupStatus::Succeeded));
    assert_eq!(report.group_status(NodeRole::QuorumStore), Some(GroupStatus::Failed));
    assert_eq!(report.group_status(NodeRole::LoadBalancer), Some(GroupStatus::Succeeded));
    assert_eq!(report.group_status(NodeRole::ControlPlane), Some(GroupStatus::Skipped));

    // Siblings of the failed node were still attempted
    assert_eq!(report.node_status("quorum-store-0"), Some(&NodeStatus::Created));
    assert_eq!(report.node_status("quorum-store-1"), Some(&NodeStatus::Failed));
    assert_eq!(report.node_status("quorum-store-2"), Some(&NodeStatus::Created));
    assert_eq!(report.node_status("load-balancer-0"), Some(&NodeStatus::Created));

    let unmet = NodeStatus::Skipped(SkipReason::DependencyUnmet {
        roles: BTreeSet::from([NodeRole::QuorumStore]),
    });
    for id in ["control-plane-0", "control-plane-1", "control-plane-2"] {
        assert_eq!(report.node_status(id), Some(&unmet));
    }

    let calls = provider.calls().await;
    assert!(!calls
        .iter()
        .any(|call| matches!(call, ProviderCall::Create(id) if id.starts_with("control-plane"))));
}

#[tokio::test]
async fn test_rerun_after_fix_converges() {
    let provider = Arc::new(InMemoryProvider::new().failing_create(["quorum-store-1"]));
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider.clone());
    orchestrator.create_cluster().await;

    provider.clear_failures().await;
    let report = orchestrator.create_cluster().await;

    assert_eq!(report.outcome, RunState::Succeeded);
    assert_eq!(report.node_status("quorum-store-1"), Some(&NodeStatus::Created));
    assert_eq!(provider.node_ids().await.len(), 8);

    // Existing machines were reported as conflicts, never duplicated
    let storage_creates = provider
        .calls()
        .await
        .into_iter()
        .filter(|call| *call == ProviderCall::Create("storage-0".to_string()))
        .count();
    assert_eq!(storage_creates, 2);
}

#[tokio::test]
async fn test_delete_partial_cluster_in_reverse_order() {
    let provider = Arc::new(InMemoryProvider::new().failing_create(["quorum-store-1"]));
    let topology = fixtures::e2e_topology();
    let deletion_order = topology.deletion_order();
    let (orchestrator, _) = fixtures::orchestrator(topology, provider.clone());
    orchestrator.create_cluster().await;

    let report = orchestrator.delete_cluster().await;

    assert_eq!(report.operation, Operation::DeleteCluster);
    assert_eq!(report.outcome, RunState::Succeeded);
    assert!(report.nodes.iter().all(|n| n.status == NodeStatus::Destroyed));
    assert!(provider.node_ids().await.is_empty());

    let calls = provider.calls().await;
    let destroys: Vec<ProviderCall> = calls
        .into_iter()
        .filter(|call| matches!(call, ProviderCall::Destroy(_)))
        .collect();
    assert_eq!(destroys.len(), 8);

    let spans: Vec<(usize, usize)> = deletion_order
        .iter()
        .filter_map(|role| call_span(&destroys, *role))
        .collect();
    for pair in spans.windows(2) {
        assert!(pair[0].1 < pair[1].0, "groups destroyed out of order: {spans:?}");
    }
    assert_eq!(
        destroys.last(),
        Some(&ProviderCall::Destroy("storage-0".to_string()))
    );
}

#[tokio::test]
async fn test_delete_is_best_effort() {
    let provider = Arc::new(InMemoryProvider::new().failing_destroy(["control-plane-0"]));
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider.clone());
    orchestrator.create_cluster().await;

    let report = orchestrator.delete_cluster().await;

    assert_eq!(report.outcome, RunState::PartiallyFailed);
    assert_eq!(report.node_status("control-plane-0"), Some(&NodeStatus::Failed));
    assert_eq!(report.group_status(NodeRole::ControlPlane), Some(GroupStatus::Failed));
    // Groups after the failure were still torn down
    assert_eq!(report.group_status(NodeRole::QuorumStore), Some(GroupStatus::Succeeded));
    assert_eq!(report.node_status("storage-0"), Some(&NodeStatus::Destroyed));
    assert_eq!(provider.node_ids().await, vec!["control-plane-0".to_string()]);
}

#[tokio::test]
async fn test_destroy_unknown_node_succeeds() {
    let provider = InMemoryProvider::new();
    provider.destroy(&NodeHandle::new("worker-42")).await.unwrap();
    provider.destroy(&NodeHandle::new("worker-42")).await.unwrap();
}

#[tokio::test]
async fn test_second_create_is_conflict() {
    let topology = fixtures::e2e_topology();
    let spec = render::render(&topology, NodeRole::Storage, 0).unwrap();
    let provider = InMemoryProvider::new();
    let boot_config = BootConfig::new(b"{}".to_vec());

    provider.create(&spec, &boot_config).await.unwrap();
    let err = provider.create(&spec, &boot_config).await.unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(provider.node_ids().await, vec!["storage-0".to_string()]);
}

#[tokio::test]
async fn test_fan_out_is_bounded() {
    let provider = Arc::new(InMemoryProvider::new().with_latency(Duration::from_millis(20)));
    let topology = fixtures::resolved(fixtures::WORKER_CLUSTER);
    let (orchestrator, _) = fixtures::orchestrator(topology, provider.clone());
    let orchestrator = orchestrator.with_config(OrchestratorConfig::with_max_parallel(2));

    let report = orchestrator.create_cluster().await;

    assert_eq!(report.outcome, RunState::Succeeded);
    assert!(provider.peak_in_flight() <= 2);
    assert!(provider.peak_in_flight() >= 1);
}

#[tokio::test]
async fn test_cancel_before_start_skips_everything() {
    let provider = Arc::new(InMemoryProvider::new());
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider.clone());
    orchestrator.cancellation_token().cancel();

    let report = orchestrator.create_cluster().await;

    assert_eq!(report.outcome, RunState::PartiallyFailed);
    assert!(report
        .nodes
        .iter()
        .all(|n| n.status == NodeStatus::Skipped(SkipReason::Cancelled)));
    assert!(provider.calls().await.is_empty());
}

#[tokio::test]
async fn test_cancel_awaits_in_flight_and_stops_scheduling() {
    let provider = Arc::new(InMemoryProvider::new().with_latency(Duration::from_millis(200)));
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider.clone());
    let cancel = orchestrator.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = orchestrator.create_cluster().await;

    // storage-0 was in flight and finished
    assert_eq!(report.node_status("storage-0"), Some(&NodeStatus::Created));
    assert_eq!(provider.node_ids().await, vec!["storage-0".to_string()]);
    for node in report.nodes.iter().filter(|n| n.role != NodeRole::Storage) {
        assert_eq!(node.status, NodeStatus::Skipped(SkipReason::Cancelled), "{}", node.id);
    }
    assert_eq!(report.outcome, RunState::PartiallyFailed);
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let provider = Arc::new(InMemoryProvider::new().failing_create(["quorum-store-1"]));
    let (orchestrator, sink) = fixtures::orchestrator(fixtures::e2e_topology(), provider);

    let report = orchestrator.create_cluster().await;
    let events = sink.events().await;

    assert!(events.iter().all(|e| e.run_id == report.run_id));
    assert_eq!(events.first().map(|e| e.kind.name()), Some("run-started"));
    assert_eq!(
        events.last().map(|e| e.kind.clone()),
        Some(LifecycleEventKind::RunFinished {
            outcome: RunState::PartiallyFailed
        })
    );

    let node_events = events
        .iter()
        .filter(|e| matches!(e.kind, LifecycleEventKind::NodeStatusChanged { .. }))
        .count();
    assert_eq!(node_events, report.nodes.len());
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        LifecycleEventKind::GroupSkipped { role: NodeRole::ControlPlane, .. }
    )));
    assert_eq!(
        events[0].subject(),
        "cluster.kx.lifecycle.create-cluster.run-started"
    );
}

#[tokio::test]
async fn test_prepare_and_clean_are_idempotent() {
    let provider = Arc::new(InMemoryProvider::new());
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider.clone());

    for _ in 0..2 {
        let report = orchestrator.execute(Operation::PrepareProvider).await;
        assert_eq!(report.outcome, RunState::Succeeded);
        assert!(provider.is_prepared().await);
    }
    for _ in 0..2 {
        let report = orchestrator.execute(Operation::CleanProvider).await;
        assert_eq!(report.outcome, RunState::Succeeded);
        assert!(!provider.is_prepared().await);
    }
    assert_eq!(
        provider.calls().await,
        vec![
            ProviderCall::Prepare,
            ProviderCall::Prepare,
            ProviderCall::Clean,
            ProviderCall::Clean,
        ]
    );
}

#[tokio::test]
async fn test_report_round_trips_as_json() {
    let provider = Arc::new(InMemoryProvider::new().failing_create(["quorum-store-1"]));
    let (orchestrator, _) = fixtures::orchestrator(fixtures::e2e_topology(), provider);

    let report = orchestrator.create_cluster().await;
    let json = serde_json::to_string(&report).unwrap();
    let back: cim_cluster::RunReport = serde_json::from_str(&json).unwrap();

    assert_eq!(back, report);
    assert!(report.started_at <= report.finished_at);
    assert_eq!(
        report.unfinished_node_ids(),
        vec!["quorum-store-1", "control-plane-0", "control-plane-1", "control-plane-2"]
    );
}
