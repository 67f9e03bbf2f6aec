// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster topology and provisioning orchestration
//!
//! Turns a declarative cluster description into per-node boot
//! configurations and drives provider-specific machine creation and
//! teardown in dependency order.
//!
//! ```text
//! ClusterConfig ─► topology::resolve ─► render ─► compiler ─► Provider
//!                                          ▲                     ▲
//!                                          └──── Orchestrator ───┘
//! ```

pub mod compiler;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod provider;
pub mod render;
pub mod state_machine;
pub mod topology;

// Re-export commonly used types
pub use compiler::{BootConfig, BootConfigCompiler, FccCompiler, JsonCompiler};
pub use config::{ClusterConfig, ClusterSettings};
pub use domain::{Hostname, NetworkScheme, NodeRole, ResourceProfile};
pub use errors::{
    ClusterError, ClusterResult, CompileError, ConfigError, ProviderError, RenderError,
};
pub use events::{EventSink, LifecycleEvent, RecordingSink, TracingSink};
pub use orchestrator::{Operation, Orchestrator, OrchestratorConfig, RunReport};
pub use provider::{InMemoryProvider, Provider, ProviderKind, ProviderOptions};
pub use render::{NodeSpec, Variables};
pub use state_machine::{NodeStatus, RunState};
pub use topology::{resolve, ClusterTopology};
