// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle Orchestrator
//!
//! Drives one lifecycle operation against a resolved topology:
//!
//! ```text
//! prepare-provider  ──► provider.prepare()
//! create-cluster    ──► per group, in creation order:
//!                         skip if a dependency did not succeed
//!                         render whole group ─► compile ─► provider.create()  (bounded fan-out)
//! delete-cluster    ──► per group, in reverse order: provider.destroy()       (best effort)
//! clean-provider    ──► provider.clean()
//! ```
//!
//! The orchestrator never retries a provider call. Its resilience is
//! structural: ordering, skip-on-dependency-failure and idempotent
//! re-invocation of the same operation.
//!
//! # Cancellation
//!
//! Cancelling the [`CancellationToken`] stops scheduling. Calls already in
//! flight are awaited; nodes still waiting for a fan-out permit and every
//! later group end `skipped (cancelled)`.

pub mod report;
pub mod run;

pub use report::RunReport;
pub use run::{GroupRecord, GroupStatus, LifecycleRun, NodeRecord, Operation};

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compiler::BootConfigCompiler;
use crate::config::ClusterConfig;
use crate::domain::NodeRole;
use crate::errors::{ClusterResult, ProviderError};
use crate::events::{EventSink, LifecycleEvent, LifecycleEventKind, TracingSink};
use crate::provider::{self, NodeHandle, Provider, ProviderOptions};
use crate::render::{self, NodeSpec};
use crate::state_machine::{NodeInput, NodeStatus, SkipReason};
use crate::topology::{self, ClusterTopology};

/// Default bound on concurrent provider calls within a group
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Runtime knobs of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Concurrent provider calls within one group (at least 1)
    pub max_parallel: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

impl OrchestratorConfig {
    /// Config with a given fan-out, clamped to at least 1
    pub fn with_max_parallel(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Read `CLUSTER_MAX_PARALLEL`, falling back to the default
    pub fn from_env() -> Self {
        let max_parallel = std::env::var("CLUSTER_MAX_PARALLEL")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_PARALLEL);
        Self::with_max_parallel(max_parallel)
    }
}

/// Publishes the events of one run
#[derive(Clone)]
struct Emitter {
    sink: Arc<dyn EventSink>,
    run_id: Uuid,
    cluster: String,
    operation: Operation,
}

impl Emitter {
    async fn emit(&self, kind: LifecycleEventKind) {
        let event = LifecycleEvent::new(self.run_id, self.cluster.clone(), self.operation, kind);
        if let Err(e) = self.sink.publish(&event).await {
            warn!("Failed to publish {} event: {}", event.kind.name(), e);
        }
    }
}

type SharedRun = Arc<RwLock<LifecycleRun>>;

/// Write a node's terminal status and announce it
async fn settle_node(
    run: &SharedRun,
    emitter: &Emitter,
    node_id: &str,
    role: NodeRole,
    input: NodeInput,
    error: Option<String>,
) {
    let recorded = run.write().await.record(node_id, input, error.clone());
    match recorded {
        Ok(status) => {
            match (&status, &error) {
                (NodeStatus::Failed, Some(e)) => error!("{} failed: {}", node_id, e),
                _ => info!("{}: {}", node_id, status),
            }
            emitter
                .emit(LifecycleEventKind::NodeStatusChanged {
                    node_id: node_id.to_string(),
                    role,
                    status,
                    error,
                })
                .await;
        }
        Err(e) => warn!("Status of {} not recorded: {}", node_id, e),
    }
}

/// Wait for a fan-out permit unless the run is cancelled first
async fn acquire(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Option<tokio::sync::OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = semaphore.clone().acquire_owned() => permit.ok(),
    }
}

/// Orchestrates lifecycle operations for one topology
pub struct Orchestrator {
    topology: Arc<ClusterTopology>,
    provider: Arc<dyn Provider>,
    compiler: Arc<dyn BootConfigCompiler>,
    sink: Arc<dyn EventSink>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with default config and a tracing sink
    pub fn new(
        topology: ClusterTopology,
        provider: Arc<dyn Provider>,
        compiler: Arc<dyn BootConfigCompiler>,
    ) -> Self {
        Self {
            topology: Arc::new(topology),
            provider,
            compiler,
            sink: Arc::new(TracingSink),
            config: OrchestratorConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve a configuration document and build its provider
    ///
    /// Configuration errors surface here, before any provider call.
    pub fn from_config(
        config: &ClusterConfig,
        options: ProviderOptions,
        compiler: Arc<dyn BootConfigCompiler>,
    ) -> ClusterResult<Self> {
        let topology = topology::resolve(config)?;
        let provider = provider::build(topology.provider(), topology.settings(), options)?;
        Ok(Self::new(topology, provider, compiler))
    }

    /// Replace the runtime configuration
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish lifecycle events to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share an external cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels runs of this orchestrator
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolved topology this orchestrator drives
    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    /// Backend receiving provider calls
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Run one lifecycle operation
    pub async fn execute(&self, operation: Operation) -> RunReport {
        match operation {
            Operation::PrepareProvider => self.prepare_provider().await,
            Operation::CreateCluster => self.create_cluster().await,
            Operation::DeleteCluster => self.delete_cluster().await,
            Operation::CleanProvider => self.clean_provider().await,
        }
    }

    /// Single `provider.prepare()` call
    pub async fn prepare_provider(&self) -> RunReport {
        let provider = self.provider.clone();
        self.provider_call(Operation::PrepareProvider, async move {
            provider.prepare().await
        })
        .await
    }

    /// Single `provider.clean()` call
    pub async fn clean_provider(&self) -> RunReport {
        let provider = self.provider.clone();
        self.provider_call(Operation::CleanProvider, async move {
            provider.clean().await
        })
        .await
    }

    async fn provider_call<F>(&self, operation: Operation, call: F) -> RunReport
    where
        F: std::future::Future<Output = Result<(), ProviderError>>,
    {
        let mut run = LifecycleRun::new(operation, self.topology.name(), self.provider.kind());
        let emitter = self.emitter(&run);
        self.begin(&mut run, &emitter).await;

        let error = match call.await {
            Ok(()) => None,
            Err(e) => {
                error!("{} failed: {}", operation, e);
                Some(e.to_string())
            }
        };
        if let Err(e) = run.conclude_call(error) {
            warn!("Run {} not concluded: {}", run.id(), e);
        }
        self.finish(run, &emitter).await
    }

    /// Create every node, group by group in dependency order
    pub async fn create_cluster(&self) -> RunReport {
        let mut run = LifecycleRun::for_topology(Operation::CreateCluster, &self.topology);
        let emitter = self.emitter(&run);
        self.begin(&mut run, &emitter).await;

        let run: SharedRun = Arc::new(RwLock::new(run));
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));

        for role in self.topology.creation_order() {
            if self.cancel.is_cancelled() {
                self.skip_group(&run, &emitter, role, SkipReason::Cancelled)
                    .await;
                continue;
            }

            let unmet = self.unmet_dependencies(&run, role).await;
            if !unmet.is_empty() {
                self.skip_group(&run, &emitter, role, SkipReason::DependencyUnmet { roles: unmet })
                    .await;
                continue;
            }

            // Render the whole group first so every peer list is sealed
            // before the first machine boots.
            let specs = match render::render_group(&self.topology, role) {
                Ok(specs) => specs,
                Err(e) => {
                    error!("Rendering group {} failed: {}", role, e);
                    let ids: Vec<String> =
                        run.read().await.nodes_of(role).map(|n| n.id.clone()).collect();
                    for id in ids {
                        settle_node(&run, &emitter, &id, role, NodeInput::Failed, Some(e.to_string()))
                            .await;
                    }
                    run.write().await.settle_group(role);
                    continue;
                }
            };

            info!("Creating group {} ({} nodes)", role, specs.len());
            let tasks = specs.into_iter().map(|spec| {
                let run = run.clone();
                let emitter = emitter.clone();
                let semaphore = semaphore.clone();
                let cancel = self.cancel.clone();
                let provider = self.provider.clone();
                let compiler = self.compiler.clone();
                tokio::spawn(async move {
                    create_node(spec, run, emitter, semaphore, cancel, provider, compiler).await
                })
            });
            self.await_group(&run, &emitter, role, join_all(tasks).await)
                .await;
        }

        self.conclude(run, &emitter).await
    }

    /// Destroy every node, group by group in reverse dependency order
    ///
    /// Failures are recorded and never stop later groups.
    pub async fn delete_cluster(&self) -> RunReport {
        let mut run = LifecycleRun::for_topology(Operation::DeleteCluster, &self.topology);
        let emitter = self.emitter(&run);
        self.begin(&mut run, &emitter).await;

        let run: SharedRun = Arc::new(RwLock::new(run));
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));

        for role in self.topology.deletion_order() {
            if self.cancel.is_cancelled() {
                self.skip_group(&run, &emitter, role, SkipReason::Cancelled)
                    .await;
                continue;
            }

            let ids: Vec<String> = run.read().await.nodes_of(role).map(|n| n.id.clone()).collect();
            info!("Destroying group {} ({} nodes)", role, ids.len());
            let tasks = ids.into_iter().map(|id| {
                let run = run.clone();
                let emitter = emitter.clone();
                let semaphore = semaphore.clone();
                let cancel = self.cancel.clone();
                let provider = self.provider.clone();
                tokio::spawn(async move {
                    destroy_node(id, role, run, emitter, semaphore, cancel, provider).await
                })
            });
            self.await_group(&run, &emitter, role, join_all(tasks).await)
                .await;
        }

        self.conclude(run, &emitter).await
    }

    fn emitter(&self, run: &LifecycleRun) -> Emitter {
        Emitter {
            sink: self.sink.clone(),
            run_id: run.id(),
            cluster: run.cluster().to_string(),
            operation: run.operation(),
        }
    }

    async fn begin(&self, run: &mut LifecycleRun, emitter: &Emitter) {
        info!(
            run_id = %run.id(),
            "Starting {} for cluster {} on {}",
            run.operation(),
            run.cluster(),
            self.provider.kind()
        );
        if let Err(e) = run.start() {
            warn!("Run {} not started: {}", run.id(), e);
        }
        emitter.emit(LifecycleEventKind::RunStarted).await;
    }

    async fn finish(&self, run: LifecycleRun, emitter: &Emitter) -> RunReport {
        let report = run.report();
        info!(run_id = %report.run_id, "{} finished: {}", report.operation, report.outcome);
        emitter
            .emit(LifecycleEventKind::RunFinished {
                outcome: report.outcome,
            })
            .await;
        report
    }

    async fn conclude(&self, run: SharedRun, emitter: &Emitter) -> RunReport {
        let mut run = {
            let guard = run.read().await;
            guard.clone()
        };
        if let Err(e) = run.conclude() {
            warn!("Run {} not concluded: {}", run.id(), e);
        }
        self.finish(run, emitter).await
    }

    /// Dependencies of `role` whose group did not fully succeed
    async fn unmet_dependencies(&self, run: &SharedRun, role: NodeRole) -> BTreeSet<NodeRole> {
        let Some(group) = self.topology.group(role) else {
            return BTreeSet::new();
        };
        let run = run.read().await;
        group
            .depends_on
            .iter()
            .copied()
            .filter(|dep| run.group_status(*dep) != Some(GroupStatus::Succeeded))
            .collect()
    }

    async fn skip_group(&self, run: &SharedRun, emitter: &Emitter, role: NodeRole, reason: SkipReason) {
        warn!("Skipping group {}: {}", role, reason);
        let ids: Vec<String> = run.read().await.nodes_of(role).map(|n| n.id.clone()).collect();
        for id in ids {
            settle_node(run, emitter, &id, role, NodeInput::Skipped(reason.clone()), None).await;
        }
        run.write().await.set_group_status(role, GroupStatus::Skipped);
        emitter
            .emit(LifecycleEventKind::GroupSkipped { role, reason })
            .await;
    }

    /// Settle a group once all its tasks are done
    ///
    /// A task that panicked leaves its node pending; it is reported failed.
    async fn await_group(
        &self,
        run: &SharedRun,
        emitter: &Emitter,
        role: NodeRole,
        results: Vec<Result<(), tokio::task::JoinError>>,
    ) {
        for result in results {
            if let Err(e) = result {
                error!("Node task in group {} aborted: {}", role, e);
            }
        }
        let pending: Vec<String> = run
            .read()
            .await
            .nodes_of(role)
            .filter(|n| n.status == NodeStatus::Pending)
            .map(|n| n.id.clone())
            .collect();
        for id in pending {
            settle_node(run, emitter, &id, role, NodeInput::Failed, Some("node task aborted".to_string()))
                .await;
        }
        let status = run.write().await.settle_group(role);
        debug!("Group {} settled: {}", role, status);
    }
}

async fn create_node(
    spec: NodeSpec,
    run: SharedRun,
    emitter: Emitter,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    provider: Arc<dyn Provider>,
    compiler: Arc<dyn BootConfigCompiler>,
) {
    let Some(_permit) = acquire(&semaphore, &cancel).await else {
        settle_node(&run, &emitter, &spec.id, spec.role, NodeInput::Skipped(SkipReason::Cancelled), None)
            .await;
        return;
    };

    let boot_config = match compiler.compile(spec.role, &spec.variables).await {
        Ok(boot_config) => boot_config,
        Err(e) => {
            settle_node(&run, &emitter, &spec.id, spec.role, NodeInput::Failed, Some(e.to_string()))
                .await;
            return;
        }
    };

    debug!("Creating {} at {}", spec.id, spec.address);
    match provider.create(&spec, &boot_config).await {
        Ok(handle) => {
            debug!("Provider created {}", handle);
            settle_node(&run, &emitter, &spec.id, spec.role, NodeInput::Created, None).await;
        }
        // The machine is already up from an earlier run
        Err(e) if e.is_conflict() => {
            warn!("{} already exists: {}", spec.id, e);
            settle_node(&run, &emitter, &spec.id, spec.role, NodeInput::Created, None).await;
        }
        Err(e) => {
            settle_node(&run, &emitter, &spec.id, spec.role, NodeInput::Failed, Some(e.to_string()))
                .await;
        }
    }
}

async fn destroy_node(
    id: String,
    role: NodeRole,
    run: SharedRun,
    emitter: Emitter,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    provider: Arc<dyn Provider>,
) {
    let Some(_permit) = acquire(&semaphore, &cancel).await else {
        settle_node(&run, &emitter, &id, role, NodeInput::Skipped(SkipReason::Cancelled), None).await;
        return;
    };

    debug!("Destroying {}", id);
    match provider.destroy(&NodeHandle::new(id.clone())).await {
        Ok(()) => settle_node(&run, &emitter, &id, role, NodeInput::Destroyed, None).await,
        Err(e) if e.is_not_found() => {
            debug!("{} already absent", id);
            settle_node(&run, &emitter, &id, role, NodeInput::Destroyed, None).await;
        }
        Err(e) => settle_node(&run, &emitter, &id, role, NodeInput::Failed, Some(e.to_string())).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::JsonCompiler;
    use crate::provider::InMemoryProvider;
    use crate::state_machine::RunState;

    fn orchestrator(provider: Arc<InMemoryProvider>) -> Orchestrator {
        let config = ClusterConfig::from_yaml_str(
            r#"
provider: simulated
network:
  subnet: 10.2.0.0/24
node_groups:
  - role: control-plane
    count: 2
  - role: worker
    count: 3
"#,
        )
        .unwrap();
        let topology = topology::resolve(&config).unwrap();
        Orchestrator::new(topology, provider, Arc::new(JsonCompiler))
    }

    #[test]
    fn test_config_clamps_fan_out() {
        assert_eq!(OrchestratorConfig::with_max_parallel(0).max_parallel, 1);
        assert_eq!(OrchestratorConfig::default().max_parallel, DEFAULT_MAX_PARALLEL);
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let provider = Arc::new(InMemoryProvider::new());
        let orchestrator = orchestrator(provider.clone());

        let created = orchestrator.create_cluster().await;
        assert_eq!(created.outcome, RunState::Succeeded);
        assert_eq!(provider.node_ids().await.len(), 5);

        let deleted = orchestrator.delete_cluster().await;
        assert_eq!(deleted.outcome, RunState::Succeeded);
        assert!(provider.node_ids().await.is_empty());
        assert!(deleted
            .nodes
            .iter()
            .all(|node| node.status == NodeStatus::Destroyed));
    }

    #[tokio::test]
    async fn test_failed_group_skips_dependents() {
        let provider = Arc::new(InMemoryProvider::new().failing_create(["control-plane-1"]));
        let report = orchestrator(provider.clone()).create_cluster().await;

        assert_eq!(report.outcome, RunState::PartiallyFailed);
        assert_eq!(report.group_status(NodeRole::ControlPlane), Some(GroupStatus::Failed));
        assert_eq!(report.group_status(NodeRole::Worker), Some(GroupStatus::Skipped));
        assert_eq!(report.node_status("control-plane-0"), Some(&NodeStatus::Created));
        assert!(report.node("control-plane-1").unwrap().error.is_some());
        assert_eq!(provider.node_ids().await, vec!["control-plane-0".to_string()]);
    }

    #[tokio::test]
    async fn test_prepare_failure_is_failed() {
        let provider = Arc::new(InMemoryProvider::new().failing_prepare());
        let report = orchestrator(provider).prepare_provider().await;
        assert_eq!(report.outcome, RunState::Failed);
        assert!(report.error.is_some());
        assert!(report.nodes.is_empty());
    }
}
