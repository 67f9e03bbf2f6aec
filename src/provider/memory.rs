// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory reference provider
//!
//! Implements the full provider contract without touching any real
//! infrastructure. Failures and latency can be injected per node, and the
//! driver records every call and the highest number of calls it saw in
//! flight at once.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{NodeHandle, Provider, ProviderKind};
use crate::compiler::BootConfig;
use crate::errors::{ProviderError, ProviderResult};
use crate::render::NodeSpec;

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Prepare,
    Create(String),
    Destroy(String),
    Clean,
}

/// Machine held by the in-memory provider
#[derive(Debug, Clone)]
pub struct SimulatedNode {
    pub spec: NodeSpec,
    pub boot_config: BootConfig,
}

#[derive(Debug, Default)]
struct SimulatedState {
    prepared: bool,
    nodes: BTreeMap<String, SimulatedNode>,
    calls: Vec<ProviderCall>,
    fail_create: BTreeSet<String>,
    fail_destroy: BTreeSet<String>,
    fail_prepare: bool,
}

/// Provider that keeps machines in memory
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: RwLock<SimulatedState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every node-level call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `create` fail for the given node ids
    pub fn failing_create<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .get_mut()
            .fail_create
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Make `destroy` fail for the given node ids
    pub fn failing_destroy<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .get_mut()
            .fail_destroy
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Make `prepare` fail
    pub fn failing_prepare(mut self) -> Self {
        self.state.get_mut().fail_prepare = true;
        self
    }

    /// Stop injecting failures (simulates the operator fixing the cause)
    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.fail_create.clear();
        state.fail_destroy.clear();
        state.fail_prepare = false;
    }

    /// Whether `prepare` has run since the last `clean`
    pub async fn is_prepared(&self) -> bool {
        self.state.read().await.prepared
    }

    /// Ids of the machines currently present
    pub async fn node_ids(&self) -> Vec<String> {
        self.state.read().await.nodes.keys().cloned().collect()
    }

    /// A present machine
    pub async fn node(&self, id: &str) -> Option<SimulatedNode> {
        self.state.read().await.nodes.get(id).cloned()
    }

    /// Every call received, in arrival order
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.read().await.calls.clone()
    }

    /// Highest number of node-level calls observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = InFlight {
            counter: &self.in_flight,
        };
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Simulated
    }

    async fn prepare(&self) -> ProviderResult<()> {
        let mut state = self.state.write().await;
        state.calls.push(ProviderCall::Prepare);
        if state.fail_prepare {
            return Err(ProviderError::Transient("injected prepare failure".to_string()));
        }
        if state.prepared {
            debug!("Simulated provider already prepared");
        }
        state.prepared = true;
        Ok(())
    }

    async fn create(&self, node: &NodeSpec, boot_config: &BootConfig) -> ProviderResult<NodeHandle> {
        self.state
            .write()
            .await
            .calls
            .push(ProviderCall::Create(node.id.clone()));
        let _guard = self.enter().await;

        let mut state = self.state.write().await;
        if state.fail_create.contains(&node.id) {
            return Err(ProviderError::Transient(format!(
                "injected create failure for {}",
                node.id
            )));
        }
        if state.nodes.contains_key(&node.id) {
            return Err(ProviderError::Conflict(format!(
                "machine {} already exists",
                node.id
            )));
        }
        state.nodes.insert(
            node.id.clone(),
            SimulatedNode {
                spec: node.clone(),
                boot_config: boot_config.clone(),
            },
        );
        Ok(NodeHandle::new(node.id.clone()))
    }

    async fn destroy(&self, handle: &NodeHandle) -> ProviderResult<()> {
        self.state
            .write()
            .await
            .calls
            .push(ProviderCall::Destroy(handle.id.clone()));
        let _guard = self.enter().await;

        let mut state = self.state.write().await;
        if state.fail_destroy.contains(&handle.id) {
            return Err(ProviderError::Transient(format!(
                "injected destroy failure for {}",
                handle.id
            )));
        }
        if state.nodes.remove(&handle.id).is_none() {
            debug!("Simulated machine {} already absent", handle.id);
        }
        Ok(())
    }

    async fn clean(&self) -> ProviderResult<()> {
        let mut state = self.state.write().await;
        state.calls.push(ProviderCall::Clean);
        state.prepared = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_flight_released_when_call_dropped_during_latency() {
        let provider = InMemoryProvider::new().with_latency(Duration::from_secs(5));

        let dropped = tokio::time::timeout(Duration::from_millis(20), provider.enter()).await;
        assert!(dropped.is_err());
        assert_eq!(provider.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(provider.peak_in_flight(), 1);
    }
}
