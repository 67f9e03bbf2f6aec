// Copyright (c) 2025 - Cowboy AI, Inc.
//! Final report of a lifecycle run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::run::{GroupRecord, GroupStatus, NodeRecord, Operation};
use crate::domain::NodeRole;
use crate::provider::ProviderKind;
use crate::state_machine::{NodeStatus, RunState};

/// Every node's terminal status and the run's overall outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub operation: Operation,
    pub cluster: String,
    pub provider: ProviderKind,
    pub outcome: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub groups: Vec<GroupRecord>,
    pub nodes: Vec<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Whether the run succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Status of a node, if the topology has it
    pub fn node_status(&self, id: &str) -> Option<&NodeStatus> {
        self.node(id).map(|node| &node.status)
    }

    pub fn group_status(&self, role: NodeRole) -> Option<GroupStatus> {
        self.groups
            .iter()
            .find(|group| group.role == role)
            .map(|group| group.status)
    }

    /// Ids of nodes whose status matches
    pub fn node_ids_where(&self, predicate: impl Fn(&NodeStatus) -> bool) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| predicate(&node.status))
            .map(|node| node.id.as_str())
            .collect()
    }

    /// Ids of nodes that need another attempt
    pub fn unfinished_node_ids(&self) -> Vec<&str> {
        self.node_ids_where(|status| !status.is_success())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} ({}): {}",
            self.operation, self.cluster, self.provider, self.outcome
        )?;
        if let Some(error) = &self.error {
            writeln!(f, "  error: {}", error)?;
        }
        for group in &self.groups {
            writeln!(f, "  {:<14} {}", group.role, group.status)?;
            for node in self.nodes.iter().filter(|node| node.role == group.role) {
                let address = node
                    .address
                    .map_or_else(|| "-".to_string(), |address| address.to_string());
                match &node.error {
                    Some(error) => writeln!(
                        f,
                        "    {:<18} {:<15} {}: {}",
                        node.id, address, node.status, error
                    )?,
                    None => writeln!(f, "    {:<18} {:<15} {}", node.id, address, node.status)?,
                }
            }
        }
        Ok(())
    }
}
