// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle run record
//!
//! A [`LifecycleRun`] is the transient record of one invocation. It owns the
//! run state machine and the per-node status map. Every node starts
//! `pending` and is written exactly once; the orchestrator holds the run
//! behind a single lock so concurrent node tasks never race on it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::debug;
use uuid::Uuid;

use super::report::RunReport;
use crate::domain::NodeRole;
use crate::provider::ProviderKind;
use crate::state_machine::{
    NodeInput, NodeStatus, RunInput, RunState, StateMachine, StateMachineWithHistory,
    TransitionError, TransitionResult,
};
use crate::topology::ClusterTopology;

/// Lifecycle operation performed by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    PrepareProvider,
    CreateCluster,
    DeleteCluster,
    CleanProvider,
}

impl Operation {
    /// Canonical (CLI) name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrepareProvider => "prepare-provider",
            Self::CreateCluster => "create-cluster",
            Self::DeleteCluster => "delete-cluster",
            Self::CleanProvider => "clean-provider",
        }
    }

    /// Whether the operation fans out over the nodes of the topology
    pub fn is_node_level(&self) -> bool {
        matches!(self, Self::CreateCluster | Self::DeleteCluster)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one node group within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupStatus {
    /// Not reached yet
    Pending,
    /// Every node reached the operation's goal
    Succeeded,
    /// At least one node failed
    Failed,
    /// Not attempted (unmet dependency or cancellation)
    Skipped,
}

impl GroupStatus {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub role: NodeRole,
    pub count: u32,
    pub status: GroupStatus,
}

/// Status of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub role: NodeRole,
    pub index: u32,
    pub address: Option<Ipv4Addr>,
    #[serde(flatten)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Transient record of one lifecycle invocation
#[derive(Debug, Clone)]
pub struct LifecycleRun {
    id: Uuid,
    operation: Operation,
    cluster: String,
    provider: ProviderKind,
    state: StateMachineWithHistory<RunState>,
    nodes: Vec<NodeRecord>,
    node_index: HashMap<String, usize>,
    groups: Vec<GroupRecord>,
    error: Option<String>,
}

impl LifecycleRun {
    /// Run without nodes (provider-level operations)
    pub fn new(operation: Operation, cluster: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            operation,
            cluster: cluster.into(),
            provider,
            state: StateMachineWithHistory::new(RunState::Idle),
            nodes: Vec::new(),
            node_index: HashMap::new(),
            groups: Vec::new(),
            error: None,
        }
    }

    /// Run with every node of the topology pending, in creation order
    pub fn for_topology(operation: Operation, topology: &ClusterTopology) -> Self {
        let mut run = Self::new(operation, topology.name(), topology.provider());
        for group in topology.groups() {
            run.groups.push(GroupRecord {
                role: group.role,
                count: group.count,
                status: GroupStatus::Pending,
            });
            for (index, id) in (0..group.count).zip(group.node_ids()) {
                run.node_index.insert(id.clone(), run.nodes.len());
                run.nodes.push(NodeRecord {
                    id,
                    role: group.role,
                    index,
                    address: topology.address_of(group.role, index),
                    status: NodeStatus::Pending,
                    error: None,
                });
            }
        }
        run
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        *self.state.current_state()
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes of one group, by index
    pub fn nodes_of(&self, role: NodeRole) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.iter().filter(move |node| node.role == role)
    }

    /// `Idle → Running`
    pub fn start(&mut self) -> TransitionResult<()> {
        self.state.transition_with_history(RunInput::Start, Utc::now())
    }

    /// Write a node's terminal status
    ///
    /// Fails if the node is unknown or already has a terminal status.
    pub fn record(
        &mut self,
        id: &str,
        input: NodeInput,
        error: Option<String>,
    ) -> TransitionResult<NodeStatus> {
        let index = *self
            .node_index
            .get(id)
            .ok_or_else(|| TransitionError::UnknownSubject(id.to_string()))?;
        let node = &mut self.nodes[index];
        let (status, _) = node.status.transition(&input)?;
        debug!("Node {} → {}", id, status);
        node.status = status.clone();
        node.error = error;
        Ok(status)
    }

    pub fn set_group_status(&mut self, role: NodeRole, status: GroupStatus) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.role == role) {
            group.status = status;
        }
    }

    pub fn group_status(&self, role: NodeRole) -> Option<GroupStatus> {
        self.groups.iter().find(|g| g.role == role).map(|g| g.status)
    }

    /// Group status derived from its nodes' terminal statuses
    pub fn settle_group(&mut self, role: NodeRole) -> GroupStatus {
        let mut any_failed = false;
        let mut any_skipped = false;
        for node in self.nodes_of(role) {
            match node.status {
                NodeStatus::Failed | NodeStatus::Pending => any_failed = true,
                NodeStatus::Skipped(_) => any_skipped = true,
                NodeStatus::Created | NodeStatus::Destroyed => {}
            }
        }
        let status = if any_failed {
            GroupStatus::Failed
        } else if any_skipped {
            GroupStatus::Skipped
        } else {
            GroupStatus::Succeeded
        };
        self.set_group_status(role, status);
        status
    }

    /// Conclude from the node map: `Succeeded` iff every node succeeded
    pub fn conclude(&mut self) -> TransitionResult<RunState> {
        let input = if self.nodes.iter().all(|n| n.status.is_success()) {
            RunInput::Succeed
        } else {
            RunInput::PartiallyFail
        };
        self.state.transition_with_history(input, Utc::now())?;
        Ok(self.state())
    }

    /// Conclude a provider-level call
    pub fn conclude_call(&mut self, error: Option<String>) -> TransitionResult<RunState> {
        match error {
            None => self.state.transition_with_history(RunInput::Succeed, Utc::now())?,
            Some(error) => self.fail(error)?,
        }
        Ok(self.state())
    }

    /// `Running → Failed`
    pub fn fail(&mut self, error: impl Into<String>) -> TransitionResult<()> {
        self.error = Some(error.into());
        self.state.transition_with_history(RunInput::Fail, Utc::now())
    }

    /// Terminal outcome, if reached
    pub fn outcome(&self) -> Option<RunState> {
        let state = self.state();
        state.is_terminal().then_some(state)
    }

    /// Snapshot for reporting
    pub fn report(&self) -> RunReport {
        let history = self.state.get_history();
        let started_at = history
            .iter()
            .find(|t| t.input == RunInput::Start)
            .map(|t| t.timestamp);
        let finished_at = history
            .last()
            .filter(|t| t.to.is_terminal())
            .map(|t| t.timestamp);

        RunReport {
            run_id: self.id,
            operation: self.operation,
            cluster: self.cluster.clone(),
            provider: self.provider,
            outcome: self.state(),
            started_at,
            finished_at,
            groups: self.groups.clone(),
            nodes: self.nodes.clone(),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::state_machine::SkipReason;
    use crate::topology;

    fn topology() -> ClusterTopology {
        let config = ClusterConfig::from_yaml_str(
            r#"
provider: simulated
network:
  subnet: 10.1.0.0/24
node_groups:
  - role: quorum-store
    count: 2
  - role: worker
    count: 1
"#,
        )
        .unwrap();
        topology::resolve(&config).unwrap()
    }

    #[test]
    fn test_nodes_start_pending() {
        let run = LifecycleRun::for_topology(Operation::CreateCluster, &topology());
        assert_eq!(run.nodes().len(), 3);
        assert!(run.nodes().iter().all(|n| n.status == NodeStatus::Pending));
        assert_eq!(run.state(), RunState::Idle);
        assert_eq!(run.group_status(NodeRole::Worker), Some(GroupStatus::Pending));
    }

    #[test]
    fn test_record_is_write_once() {
        let mut run = LifecycleRun::for_topology(Operation::CreateCluster, &topology());
        run.start().unwrap();
        run.record("quorum-store-0", NodeInput::Created, None).unwrap();
        assert!(matches!(
            run.record("quorum-store-0", NodeInput::Failed, None),
            Err(TransitionError::InvalidTransition { .. })
        ));
        assert_eq!(
            run.record("worker-7", NodeInput::Created, None),
            Err(TransitionError::UnknownSubject("worker-7".to_string()))
        );
    }

    #[test]
    fn test_conclude_requires_every_node() {
        let mut run = LifecycleRun::for_topology(Operation::CreateCluster, &topology());
        run.start().unwrap();
        run.record("quorum-store-0", NodeInput::Created, None).unwrap();
        run.record("quorum-store-1", NodeInput::Failed, Some("boom".into()))
            .unwrap();
        run.record(
            "worker-0",
            NodeInput::Skipped(SkipReason::Cancelled),
            None,
        )
        .unwrap();

        assert_eq!(run.settle_group(NodeRole::QuorumStore), GroupStatus::Failed);
        assert_eq!(run.settle_group(NodeRole::Worker), GroupStatus::Skipped);
        assert_eq!(run.conclude().unwrap(), RunState::PartiallyFailed);
        assert_eq!(run.outcome(), Some(RunState::PartiallyFailed));
    }

    #[test]
    fn test_provider_call_failure() {
        let mut run = LifecycleRun::new(Operation::PrepareProvider, "kx", ProviderKind::Simulated);
        run.start().unwrap();
        assert_eq!(
            run.conclude_call(Some("download failed".into())).unwrap(),
            RunState::Failed
        );
        let report = run.report();
        assert_eq!(report.error.as_deref(), Some("download failed"));
        assert!(report.started_at.is_some());
        assert!(report.finished_at.is_some());
    }
}
