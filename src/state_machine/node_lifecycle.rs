// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node Status State Machine
//!
//! Every node starts `Pending` in a run and receives exactly one terminal
//! status. A second write is an invalid transition, which is how the
//! write-once rule of the per-node status map is enforced.
//!
//! ```text
//!            ┌──► Created
//!            ├──► Failed
//! Pending ───┼──► Skipped(reason)
//!            └──► Destroyed
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};
use crate::domain::NodeRole;

/// Why a node was never attempted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum SkipReason {
    /// A group this node's group depends on did not fully succeed
    DependencyUnmet { roles: BTreeSet<NodeRole> },
    /// The run was cancelled before the node was started
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyUnmet { roles } => {
                let roles: Vec<&str> = roles.iter().map(NodeRole::as_str).collect();
                write!(f, "dependency unmet: {}", roles.join(", "))
            }
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of one node within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum NodeStatus {
    Pending,
    Created,
    Failed,
    Skipped(SkipReason),
    Destroyed,
}

/// Input deciding a node's terminal status
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeInput {
    Created,
    Failed,
    Skipped(SkipReason),
    Destroyed,
}

impl NodeStatus {
    /// Short status name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Failed => "failed",
            Self::Skipped(_) => "skipped",
            Self::Destroyed => "destroyed",
        }
    }

    /// Whether the node reached the operation's goal
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created | Self::Destroyed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped ({})", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl fmt::Display for NodeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped(reason) => write!(f, "skipped ({})", reason),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

impl StateMachine for NodeStatus {
    type Input = NodeInput;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        match (self, input) {
            (NodeStatus::Pending, NodeInput::Created) => Ok((NodeStatus::Created, ())),
            (NodeStatus::Pending, NodeInput::Failed) => Ok((NodeStatus::Failed, ())),
            (NodeStatus::Pending, NodeInput::Skipped(reason)) => {
                Ok((NodeStatus::Skipped(reason.clone()), ()))
            }
            (NodeStatus::Pending, NodeInput::Destroyed) => Ok((NodeStatus::Destroyed, ())),
            (from, to) => Err(TransitionError::invalid(from, to)),
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, NodeStatus::Pending)
    }
}
