// Copyright (c) 2025 - Cowboy AI, Inc.
//! Boot Configuration Compilers
//!
//! A compiler turns `(role, variables)` into an opaque [`BootConfig`] a
//! provider can hand to a machine at first boot. The orchestrator never
//! looks inside the result.
//!
//! - [`JsonCompiler`] - canonical JSON of the variables (dry runs, tests)
//! - [`FccCompiler`] - Fedora CoreOS Config transpiled to Ignition by `fcct`

pub mod fcc;

pub use fcc::{merge_documents, FccCompiler};

use async_trait::async_trait;
use serde_json::json;
use std::fmt;

use crate::domain::NodeRole;
use crate::errors::CompileResult;
use crate::render::Variables;

/// Opaque, provider-consumable boot configuration
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BootConfig(Vec<u8>);

impl BootConfig {
    /// Wrap compiled bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Compiled bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the compiled bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was produced
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for BootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BootConfig({} bytes)", self.0.len())
    }
}

/// Black-box transform from node variables to a boot configuration
#[async_trait]
pub trait BootConfigCompiler: Send + Sync {
    /// Compile the boot configuration of one node
    async fn compile(&self, role: NodeRole, variables: &Variables) -> CompileResult<BootConfig>;
}

/// Compiler emitting the variables as canonical JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCompiler;

#[async_trait]
impl BootConfigCompiler for JsonCompiler {
    async fn compile(&self, role: NodeRole, variables: &Variables) -> CompileResult<BootConfig> {
        let document = json!({
            "role": role,
            "variables": variables,
        });
        Ok(BootConfig::new(serde_json::to_vec(&document)?))
    }
}
