// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for lifecycle events
//!
//! # Subject Pattern
//!
//! ```text
//! cluster.{name}.lifecycle.{operation}.{event}
//! ```
//!
//! This allows for:
//! - Precise subscriptions (`cluster.kx.lifecycle.create-cluster.run-finished`)
//! - Per-cluster wildcards (`cluster.kx.lifecycle.>`)
//! - Global subscriptions (`cluster.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_cluster::events::SubjectBuilder;
//! use cim_cluster::orchestrator::Operation;
//!
//! let subject = SubjectBuilder::new("kx")
//!     .operation(Operation::CreateCluster)
//!     .event("node-status-changed")
//!     .build();
//! assert_eq!(subject, "cluster.kx.lifecycle.create-cluster.node-status-changed");
//!
//! // Unset tokens become single-token wildcards
//! let any_finish = SubjectBuilder::new("kx").event("run-finished").build();
//! assert_eq!(any_finish, "cluster.kx.lifecycle.*.run-finished");
//! ```

use crate::orchestrator::Operation;

/// Root namespace for all cluster subjects
pub const CLUSTER_ROOT: &str = "cluster";

/// Token separating cluster identity from lifecycle events
pub const LIFECYCLE_TOKEN: &str = "lifecycle";

/// Builder for lifecycle NATS subjects
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    cluster: String,
    operation: Option<Operation>,
    event: Option<String>,
}

impl SubjectBuilder {
    /// Start a subject for a cluster
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: sanitize(&cluster.into()),
            operation: None,
            event: None,
        }
    }

    /// Set the operation
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Set the event name
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(sanitize(&event.into()));
        self
    }

    /// Build the subject; unset tokens are `*`
    pub fn build(self) -> String {
        let operation = self
            .operation
            .map_or_else(|| "*".to_string(), |op| op.as_str().to_string());
        let event = self.event.unwrap_or_else(|| "*".to_string());
        format!(
            "{}.{}.{}.{}.{}",
            CLUSTER_ROOT, self.cluster, LIFECYCLE_TOKEN, operation, event
        )
    }

    /// Build a subscription for every lifecycle event of the cluster
    ///
    /// Returns: `cluster.{name}.lifecycle.>`
    pub fn build_wildcard(self) -> String {
        format!("{}.{}.{}.>", CLUSTER_ROOT, self.cluster, LIFECYCLE_TOKEN)
    }

    /// Build a subscription for all cluster events
    ///
    /// Returns: `cluster.>`
    pub fn build_all() -> String {
        format!("{}.>", CLUSTER_ROOT)
    }
}

/// NATS tokens may not contain separators, wildcards or whitespace
fn sanitize(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
