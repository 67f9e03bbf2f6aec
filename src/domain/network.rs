// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Addressing Value Objects with Validation Invariants
//!
//! A cluster lives in one IPv4 subnet. Offsets are counted from the network
//! address:
//!
//! ```text
//! offset 0                network address
//! offset 1..=reserved     gateway and other provider-owned addresses
//! first_usable..end       node address blocks
//! end                     broadcast
//! ```

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Subnet {0} has host bits set (expected {1})")]
    NotNetworkAddress(String, String),

    #[error("Prefix length /{0} leaves no room for nodes (must be /30 or shorter)")]
    PrefixTooLong(u8),

    #[error("addresses_per_node must be at least 1")]
    ZeroAddressesPerNode,

    #[error("reserved_addresses must be at least 1 to keep the gateway out of node blocks")]
    GatewayNotReserved,

    #[error("reserved_addresses {reserved} leaves no usable addresses in a subnet of {hosts} hosts")]
    ReservedExceedsSubnet { reserved: u32, hosts: u64 },
}

/// Contiguous range of subnet offsets owned by one node group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressBlock {
    /// First offset from the network address
    pub offset: u32,
    /// Number of addresses in the block
    pub len: u32,
}

impl AddressBlock {
    /// Create a block
    pub fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// One past the last offset (saturating)
    pub fn end(&self) -> u32 {
        self.offset.saturating_add(self.len)
    }

    /// Whether the block holds no addresses
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether two blocks share at least one offset
    ///
    /// Empty blocks never overlap anything.
    pub fn overlaps(&self, other: &AddressBlock) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

impl fmt::Display for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.offset, self.end())
    }
}

/// Addressing scheme of a cluster: base subnet plus allocation rule
///
/// # Examples
///
/// ```rust
/// use cim_cluster::domain::NetworkScheme;
///
/// let network = NetworkScheme::new("10.13.13.0/24", 1, 1).unwrap();
/// assert_eq!(network.gateway().to_string(), "10.13.13.1");
/// assert_eq!(network.first_usable_offset(), 2);
/// assert_eq!(network.usable_count(), 253);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkScheme {
    subnet: Ipv4Net,
    reserved_addresses: u32,
    addresses_per_node: u32,
}

impl NetworkScheme {
    /// Longest prefix that still has a network and broadcast address
    pub const MAX_PREFIX: u8 = 30;

    /// Create a scheme from CIDR notation
    ///
    /// # Invariants
    /// - `subnet` is an IPv4 network address in CIDR form, /30 or shorter
    /// - the gateway (offset 1) is always reserved
    /// - at least one address remains after the reserved ones
    /// - every node gets at least one address
    pub fn new(
        subnet: impl AsRef<str>,
        reserved_addresses: u32,
        addresses_per_node: u32,
    ) -> Result<Self, NetworkError> {
        let raw = subnet.as_ref().trim();
        let parsed: Ipv4Net = raw
            .parse()
            .map_err(|_| NetworkError::InvalidCidr(raw.to_string()))?;

        if parsed.prefix_len() > Self::MAX_PREFIX {
            return Err(NetworkError::PrefixTooLong(parsed.prefix_len()));
        }

        if parsed.addr() != parsed.network() {
            return Err(NetworkError::NotNetworkAddress(
                raw.to_string(),
                parsed.trunc().to_string(),
            ));
        }

        if addresses_per_node == 0 {
            return Err(NetworkError::ZeroAddressesPerNode);
        }

        if reserved_addresses == 0 {
            return Err(NetworkError::GatewayNotReserved);
        }

        let scheme = Self {
            subnet: parsed,
            reserved_addresses,
            addresses_per_node,
        };

        if u64::from(reserved_addresses) >= scheme.host_count() {
            return Err(NetworkError::ReservedExceedsSubnet {
                reserved: reserved_addresses,
                hosts: scheme.host_count(),
            });
        }

        Ok(scheme)
    }

    /// The subnet in CIDR form
    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    /// Network (base) address
    pub fn base(&self) -> Ipv4Addr {
        self.subnet.network()
    }

    /// Prefix length of the subnet
    pub fn prefix_length(&self) -> u8 {
        self.subnet.prefix_len()
    }

    /// Gateway address (first host address)
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base()) + 1)
    }

    /// Addresses consumed by each node
    pub fn addresses_per_node(&self) -> u32 {
        self.addresses_per_node
    }

    /// Addresses reserved after the network address
    pub fn reserved_addresses(&self) -> u32 {
        self.reserved_addresses
    }

    /// Host addresses in the subnet (excludes network and broadcast)
    pub fn host_count(&self) -> u64 {
        (1u64 << (32 - u32::from(self.prefix_length()))) - 2
    }

    /// Host addresses left for nodes
    pub fn usable_count(&self) -> u64 {
        self.host_count() - u64::from(self.reserved_addresses)
    }

    /// First offset a node block may start at
    pub fn first_usable_offset(&self) -> u32 {
        1 + self.reserved_addresses
    }

    /// Offset of the broadcast address (exclusive end of usable offsets)
    pub fn end_offset(&self) -> u32 {
        // host_count + 1 always fits: prefix is at least /0 and counts stay below 2^32
        (self.host_count() + 1) as u32
    }

    /// Whether a block lies entirely inside the usable range
    pub fn contains_block(&self, block: &AddressBlock) -> bool {
        block.is_empty()
            || (block.offset >= self.first_usable_offset() && block.end() <= self.end_offset())
    }

    /// Address at an offset, if the offset is a usable node offset
    pub fn address_at(&self, offset: u32) -> Option<Ipv4Addr> {
        if offset < self.first_usable_offset() || offset >= self.end_offset() {
            return None;
        }
        u32::from(self.base()).checked_add(offset).map(Ipv4Addr::from)
    }
}

impl fmt::Display for NetworkScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subnet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_24() {
        let network = NetworkScheme::new("10.13.13.0/24", 1, 1).unwrap();
        assert_eq!(network.base(), Ipv4Addr::new(10, 13, 13, 0));
        assert_eq!(network.host_count(), 254);
        assert_eq!(network.usable_count(), 253);
        assert_eq!(network.first_usable_offset(), 2);
        assert_eq!(network.end_offset(), 255);
        assert_eq!(network.address_at(2), Some(Ipv4Addr::new(10, 13, 13, 2)));
        assert_eq!(network.address_at(254), Some(Ipv4Addr::new(10, 13, 13, 254)));
        assert_eq!(network.address_at(255), None);
        assert_eq!(network.address_at(1), None);
    }

    #[test]
    fn test_invalid_networks() {
        assert!(matches!(
            NetworkScheme::new("10.13.13.0", 1, 1),
            Err(NetworkError::InvalidCidr(_))
        ));
        assert!(matches!(
            NetworkScheme::new("10.13.13.7/24", 1, 1),
            Err(NetworkError::NotNetworkAddress(_, expected)) if expected == "10.13.13.0/24"
        ));
        assert!(matches!(
            NetworkScheme::new("10.13.13.0/31", 1, 1),
            Err(NetworkError::PrefixTooLong(31))
        ));
        assert!(matches!(
            NetworkScheme::new("10.13.13.0/24", 1, 0),
            Err(NetworkError::ZeroAddressesPerNode)
        ));
        assert_eq!(
            NetworkScheme::new("10.13.13.0/24", 0, 1),
            Err(NetworkError::GatewayNotReserved)
        );
        assert!(matches!(
            NetworkScheme::new("10.13.13.0/30", 2, 1),
            Err(NetworkError::ReservedExceedsSubnet { .. })
        ));
    }

    #[test]
    fn test_block_overlap() {
        let a = AddressBlock::new(2, 3);
        assert!(a.overlaps(&AddressBlock::new(4, 1)));
        assert!(!a.overlaps(&AddressBlock::new(5, 3)));
        assert!(!a.overlaps(&AddressBlock::new(3, 0)));
    }

    #[test]
    fn test_contains_block() {
        let network = NetworkScheme::new("192.168.0.0/29", 1, 1).unwrap();
        assert!(network.contains_block(&AddressBlock::new(2, 5)));
        assert!(!network.contains_block(&AddressBlock::new(2, 6)));
        assert!(!network.contains_block(&AddressBlock::new(1, 1)));
        assert!(network.contains_block(&AddressBlock::new(0, 0)));
    }
}
