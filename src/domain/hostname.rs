// Copyright (c) 2025 - Cowboy AI, Inc.
//! Hostname Value Object with DNS Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Hostname validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostnameError {
    #[error("Hostname is empty")]
    Empty,

    #[error("Hostname exceeds maximum length of 253 characters: {0}")]
    TooLong(usize),

    #[error("Label exceeds maximum length of 63 characters: {0}")]
    LabelTooLong(String),

    #[error("Invalid character in hostname: {0}")]
    InvalidCharacter(char),

    #[error("Label cannot start or end with hyphen: {0}")]
    InvalidLabelFormat(String),

    #[error("Top-level label cannot be all numeric: {0}")]
    NumericLabel(String),
}

/// Node hostname
///
/// Represents a valid DNS hostname following RFC 1123 with invariants:
/// - Total length ≤ 253 characters
/// - Each label ≤ 63 characters
/// - Labels contain only alphanumeric characters and hyphens
/// - Labels cannot start or end with hyphens
/// - The last label cannot be all numeric
///
/// Hostnames are always stored lowercase so that two renders of the same
/// node compare equal byte for byte.
///
/// # Examples
///
/// ```rust
/// use cim_cluster::domain::Hostname;
///
/// let host = Hostname::for_node("quorum-store-0", Some("kx.internal")).unwrap();
/// assert_eq!(host.as_str(), "quorum-store-0.kx.internal");
/// assert_eq!(host.short_name(), "quorum-store-0");
///
/// assert!(Hostname::new("-invalid").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Maximum total length for FQDN (RFC 1123)
    pub const MAX_LENGTH: usize = 253;

    /// Maximum length for a single label (RFC 1123)
    pub const MAX_LABEL_LENGTH: usize = 63;

    /// Create a new hostname with validation
    pub fn new(hostname: impl Into<String>) -> Result<Self, HostnameError> {
        let hostname = hostname.into().to_lowercase();

        if hostname.is_empty() {
            return Err(HostnameError::Empty);
        }

        if hostname.len() > Self::MAX_LENGTH {
            return Err(HostnameError::TooLong(hostname.len()));
        }

        for label in hostname.split('.') {
            Self::validate_label(label)?;
        }

        if let Some(last) = hostname.rsplit('.').next() {
            if last.chars().all(|c| c.is_ascii_digit()) {
                return Err(HostnameError::NumericLabel(last.to_string()));
            }
        }

        Ok(Self(hostname))
    }

    /// Hostname for a node id, optionally qualified with a cluster domain
    pub fn for_node(node_id: &str, domain: Option<&str>) -> Result<Self, HostnameError> {
        match domain {
            Some(domain) if !domain.is_empty() => Self::new(format!("{node_id}.{domain}")),
            _ => Self::new(node_id),
        }
    }

    fn validate_label(label: &str) -> Result<(), HostnameError> {
        if label.is_empty() {
            return Err(HostnameError::Empty);
        }

        if label.len() > Self::MAX_LABEL_LENGTH {
            return Err(HostnameError::LabelTooLong(label.to_string()));
        }

        if let Some(ch) = label
            .chars()
            .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '-')
        {
            return Err(HostnameError::InvalidCharacter(ch));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(HostnameError::InvalidLabelFormat(label.to_string()));
        }

        Ok(())
    }

    /// Get the hostname as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the short name (first label before first dot)
    pub fn short_name(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Get the domain name (everything after first dot)
    pub fn domain(&self) -> Option<&str> {
        self.0.split_once('.').map(|(_, domain)| domain)
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Hostname {
    type Error = HostnameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
