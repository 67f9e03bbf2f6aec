// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster Domain Models
//!
//! Value objects shared by topology resolution, rendering and providers.
//!
//! - [`NodeRole`] - Role a node plays in the cluster
//! - [`ResourceProfile`] - CPU and memory per node
//! - [`Hostname`] - DNS-validated hostnames (RFC 1123)
//! - [`NetworkScheme`] - Base subnet and allocation rule
//! - [`AddressBlock`] - Offsets owned by one node group

pub mod hostname;
pub mod network;
pub mod role;

pub use hostname::{Hostname, HostnameError};
pub use network::{AddressBlock, NetworkError, NetworkScheme};
pub use role::{NodeRole, ResourceProfile};
