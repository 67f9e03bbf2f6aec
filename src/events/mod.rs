// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle Events
//!
//! Facts the orchestrator emits while a run progresses. Events are
//! immutable, past tense and carry enough identity (event id, run id,
//! cluster, operation) to be correlated by any consumer.
//!
//! # Event Flow
//!
//! ```text
//! Orchestrator ──► EventSink ──► tracing / memory / NATS
//! ```
//!
//! A sink failure is logged and never changes the outcome of a run.
//!
//! # Sinks
//!
//! - [`TracingSink`] - structured log lines (default)
//! - [`RecordingSink`] - keeps events in memory
//! - `NatsEventSink` - publishes JSON to NATS (feature `nats`)

#[cfg(feature = "nats")]
pub mod nats;
pub mod subjects;

#[cfg(feature = "nats")]
pub use nats::{NatsConfig, NatsEventSink};
pub use subjects::SubjectBuilder;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::domain::NodeRole;
use crate::errors::EventResult;
use crate::orchestrator::Operation;
use crate::state_machine::{NodeStatus, RunState, SkipReason};

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LifecycleEventKind {
    /// The run left `Idle`
    RunStarted,

    /// A node received its terminal status
    NodeStatusChanged {
        node_id: String,
        role: NodeRole,
        status: NodeStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A whole group was not attempted
    GroupSkipped { role: NodeRole, reason: SkipReason },

    /// The run reached a terminal state
    RunFinished { outcome: RunState },
}

impl LifecycleEventKind {
    /// Subject token naming the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted => "run-started",
            Self::NodeStatusChanged { .. } => "node-status-changed",
            Self::GroupSkipped { .. } => "group-skipped",
            Self::RunFinished { .. } => "run-finished",
        }
    }
}

/// Envelope of every lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Unique event identifier (UUID v7)
    pub event_id: Uuid,
    /// Run the event belongs to
    pub run_id: Uuid,
    /// Cluster name
    pub cluster: String,
    /// Lifecycle operation of the run
    pub operation: Operation,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// What happened
    #[serde(flatten)]
    pub kind: LifecycleEventKind,
}

impl LifecycleEvent {
    /// Stamp a new event
    pub fn new(
        run_id: Uuid,
        cluster: impl Into<String>,
        operation: Operation,
        kind: LifecycleEventKind,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            run_id,
            cluster: cluster.into(),
            operation,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// NATS subject of this event
    pub fn subject(&self) -> String {
        SubjectBuilder::new(&self.cluster)
            .operation(self.operation)
            .event(self.kind.name())
            .build()
    }
}

/// Destination of lifecycle events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event
    async fn publish(&self, event: &LifecycleEvent) -> EventResult<()>;
}

/// Sink writing events as log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, event: &LifecycleEvent) -> EventResult<()> {
        match &event.kind {
            LifecycleEventKind::RunStarted => {
                info!(run_id = %event.run_id, cluster = %event.cluster, "{} started", event.operation)
            }
            LifecycleEventKind::NodeStatusChanged {
                node_id,
                status,
                error,
                ..
            } => match error {
                Some(error) => info!(run_id = %event.run_id, "{}: {} ({})", node_id, status, error),
                None => info!(run_id = %event.run_id, "{}: {}", node_id, status),
            },
            LifecycleEventKind::GroupSkipped { role, reason } => {
                info!(run_id = %event.run_id, "Group {} skipped: {}", role, reason)
            }
            LifecycleEventKind::RunFinished { outcome } => {
                info!(run_id = %event.run_id, cluster = %event.cluster, "{} finished: {}", event.operation, outcome)
            }
        }
        Ok(())
    }
}

/// Sink keeping every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RwLock<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in order
    pub async fn events(&self) -> Vec<LifecycleEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &LifecycleEvent) -> EventResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}
