// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for cluster provisioning
//!
//! The taxonomy follows the propagation rules of the orchestrator:
//!
//! - [`ConfigError`] aborts a run before any provider call is made.
//! - [`CompileError`] fails a single node; its siblings are unaffected.
//! - [`ProviderError`] wraps a failed provider call and classifies it so the
//!   orchestrator can treat `NotFound` on destroy as success.
//! - Dependency skips are statuses, not errors (see `orchestrator::run`).

use std::time::Duration;

use thiserror::Error;

use crate::domain::{HostnameError, NetworkError, NodeRole};

/// Invalid topology configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document could not be read or parsed
    #[error("Failed to parse cluster configuration: {0}")]
    Parse(String),

    /// Provider tag is not a known provider
    #[error("Unknown provider '{0}' (expected one of: vagrant, simulated)")]
    UnknownProvider(String),

    /// Provider is known but not compiled into this build
    #[error("Provider '{0}' is not available in this build")]
    ProviderUnavailable(String),

    /// Role name is not a known role
    #[error("Unknown node role '{0}'")]
    UnknownRole(String),

    /// Two node groups declare the same role
    #[error("Node group role '{0}' is declared more than once")]
    DuplicateRole(NodeRole),

    /// A count field is negative
    #[error("Node group '{role}' has negative count {count}")]
    NegativeCount { role: NodeRole, count: i64 },

    /// A count field does not fit the address space at all
    #[error("Node group '{role}' count {count} is too large")]
    CountTooLarge { role: NodeRole, count: i64 },

    /// Topology contains no nodes
    #[error("Topology must contain at least one node")]
    EmptyTopology,

    /// A resource profile is unusable
    #[error("Node group '{role}' has invalid resources: {reason}")]
    InvalidResources { role: NodeRole, reason: String },

    /// `depends_on` names a role that no group declares
    #[error("Node group '{role}' depends on undeclared role '{dependency}'")]
    UnknownDependency { role: NodeRole, dependency: NodeRole },

    /// The role dependency graph is cyclic
    #[error("Role dependencies form a cycle through: {}", format_roles(.roles))]
    DependencyCycle { roles: Vec<NodeRole> },

    /// Network scheme is invalid
    #[error("Invalid network: {0}")]
    Network(#[from] NetworkError),

    /// Nodes need more addresses than the subnet can provide
    #[error("Subnet {subnet} has {usable} usable addresses but the topology needs {required}")]
    SubnetOverflow {
        subnet: String,
        required: u64,
        usable: u64,
    },

    /// An address block extends past the usable range
    #[error("Address block of '{role}' ({start}..{end}) is outside the usable range of {subnet}")]
    BlockOutOfRange {
        role: NodeRole,
        subnet: String,
        start: u32,
        end: u32,
    },

    /// Two pinned address blocks overlap
    #[error("Address blocks of '{first}' and '{second}' overlap")]
    OverlappingAddressRanges { first: NodeRole, second: NodeRole },

    /// Derived hostname is not a valid DNS name
    #[error("Invalid hostname: {0}")]
    Hostname(#[from] HostnameError),

    /// SSH key does not look like an OpenSSH public key
    #[error("ssh_keys[{index}] is not an OpenSSH public key")]
    InvalidSshKey { index: usize },

    /// Required setting is empty
    #[error("Setting '{0}' must not be empty")]
    EmptySetting(&'static str),
}

fn format_roles(roles: &[NodeRole]) -> String {
    roles
        .iter()
        .map(|role| role.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Result type for topology resolution
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Rendering a node that the topology does not contain
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Role has no group in this topology
    #[error("Topology has no '{0}' node group")]
    UnknownGroup(NodeRole),

    /// Index is past the end of the group
    #[error("Index {index} is out of range for '{role}' (count {count})")]
    IndexOutOfRange {
        role: NodeRole,
        index: u32,
        count: u32,
    },

    /// Address arithmetic left the subnet
    #[error("Address for '{role}' index {index} is outside the subnet")]
    AddressOutOfRange { role: NodeRole, index: u32 },

    /// Hostname derivation failed
    #[error("Invalid hostname: {0}")]
    Hostname(#[from] HostnameError),
}

/// Result type for rendering
pub type RenderResult<T> = Result<T, RenderError>;

/// Boot configuration could not be produced for a node
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Variable the compiler relies on is missing
    #[error("Missing variable '{0}'")]
    MissingVariable(String),

    /// Variable is present but unusable
    #[error("Invalid variable '{key}': {reason}")]
    InvalidVariable { key: String, reason: String },

    /// Two fragments write the same file
    #[error("Duplicate file path in boot configuration: {0}")]
    DuplicatePath(String),

    /// Document serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// External transpiler failed
    #[error("Transpiler failed: {0}")]
    Transpiler(String),
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        CompileError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for CompileError {
    fn from(err: serde_yaml::Error) -> Self {
        CompileError::Serialization(err.to_string())
    }
}

/// Result type for boot configuration compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Failed provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failure that may succeed when the same lifecycle operation is re-run
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The target already exists in a state the call cannot reconcile
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The target does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider call did not finish in time
    #[error("Provider call '{operation}' timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    /// Provider cannot be used at all
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Local filesystem or process error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Whether the target already existed
    pub fn is_conflict(&self) -> bool {
        matches!(self, ProviderError::Conflict(_))
    }

    /// Whether the target was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    /// Whether re-running the operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::Timeout { .. } | ProviderError::Io(_)
        )
    }

    /// Build a timeout error for the given operation
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        ProviderError::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Lifecycle event could not be delivered
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Event could not be encoded
    #[error("Event serialization failed: {0}")]
    Serialization(String),

    /// Transport rejected or dropped the event
    #[error("Event publish failed: {0}")]
    Publish(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}

/// Result type for event sinks
pub type EventResult<T> = Result<T, EventError>;

/// Errors surfaced to callers of the crate's top-level helpers
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Configuration rejected before any work started
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Provider call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for top-level helpers
pub type ClusterResult<T> = Result<T, ClusterError>;
