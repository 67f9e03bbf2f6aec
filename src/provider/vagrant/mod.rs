// Copyright (c) 2025 - Cowboy AI, Inc.
//! Vagrant/libvirt provider
//!
//! Runs every node as a Fedora CoreOS libvirt machine managed by Vagrant.
//!
//! ```text
//! work_dir/
//! ├── boxes/
//! │   ├── fedora-coreos-{version}.box   packaged vagrant-libvirt box
//! │   └── fedora-coreos.box             symlink to the current box
//! ├── images/                           downloaded and decompressed images
//! └── machines/{node-id}/
//!     ├── Vagrantfile
//!     └── ignition.json                 boot configuration (0600)
//! ```
//!
//! The driver is compiled with the `vagrant` feature; [`VagrantConfig`] is
//! always available so callers can carry settings regardless.

#[cfg(feature = "vagrant")]
mod box_image;
#[cfg(feature = "vagrant")]
mod commands;
#[cfg(feature = "vagrant")]
mod driver;

#[cfg(feature = "vagrant")]
pub use driver::VagrantProvider;

use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

/// Stream that Fedora CoreOS builds are published under
pub const DEFAULT_IMAGE_BASE_URL: &str =
    "https://builds.coreos.fedoraproject.org/prod/streams/stable/builds";

/// Public half of Vagrant's well-known insecure key pair
pub const VAGRANT_INSECURE_PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAABIwAAAQEA6NF8iallvQVp22WDkTkyrtvp9eWW6A8YVr+kz4TjGYe7gHzIw+niNltGEFHzD8+v1I2YJ6oXevct1YeS0o9HZyN1Q9qgCgzUFtdOKLv6IedplqoPkcmF0aYet2PkEDo3MlTBckFXPITAMzF8dJSIFo9D8HfdOV0IAdx4O7PtixWKn5y2hMNG0zQPyUecp4pzC6kivAIhyfHilFR61RGL+GPXQ2MWZWFYbAGjyiYJnAmCP3NOTd0jMZEnDkbUvxhMmBYSdETk1rRgm+R4LOzFUGaHqHDLKLX+FIPKcF96hrucXzcWyLbIbEgE98OHlnVYCzRdK8jlqm8tehUc9c9WhQ== vagrant insecure public key";

/// Settings of the Vagrant driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VagrantConfig {
    /// Root of boxes, images and machine directories
    pub work_dir: PathBuf,
    /// Base URL of Fedora CoreOS builds
    pub image_base_url: String,
    /// Upper bound for one `vagrant`/`xz` invocation
    pub command_timeout: Duration,
    /// Upper bound for the base image download
    pub download_timeout: Duration,
    /// Private key Vagrant uses to reach the `core` user
    pub ssh_private_key_path: Option<PathBuf>,
    /// libvirt network machines attach to
    pub libvirt_network: String,
}

impl Default for VagrantConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(".cim-cluster/vagrant"),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            command_timeout: Duration::from_secs(600),
            download_timeout: Duration::from_secs(1800),
            ssh_private_key_path: None,
            libvirt_network: "cim-cluster".to_string(),
        }
    }
}

impl VagrantConfig {
    /// Read settings from `VAGRANT_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("VAGRANT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            image_base_url: std::env::var("VAGRANT_IMAGE_BASE_URL")
                .unwrap_or(defaults.image_base_url),
            command_timeout: std::env::var("VAGRANT_COMMAND_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            download_timeout: std::env::var("VAGRANT_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            ssh_private_key_path: std::env::var("VAGRANT_SSH_PRIVATE_KEY")
                .ok()
                .map(PathBuf::from),
            libvirt_network: std::env::var("VAGRANT_LIBVIRT_NETWORK")
                .unwrap_or(defaults.libvirt_network),
        }
    }

    /// Directory holding packaged boxes
    pub fn boxes_dir(&self) -> PathBuf {
        self.work_dir.join("boxes")
    }

    /// Directory holding downloaded images
    pub fn images_dir(&self) -> PathBuf {
        self.work_dir.join("images")
    }

    /// Directory of one machine
    pub fn machine_dir(&self, node_id: &str) -> PathBuf {
        self.work_dir.join("machines").join(node_id)
    }
}

/// Boot configuration overlay granting the `vagrant` user access
///
/// Vagrant logs in with its insecure key unless `ssh_private_key_path` is
/// set; merge this into every node's document for that case.
pub fn vagrant_user_overlay() -> serde_json::Value {
    json!({
        "passwd": {
            "users": [{
                "name": "vagrant",
                "ssh_authorized_keys": [VAGRANT_INSECURE_PUBLIC_KEY],
            }]
        },
        "storage": {
            "files": [{
                "path": "/etc/sudoers.d/vagrant",
                "contents": { "inline": "vagrant ALL=(ALL) NOPASSWD: ALL" },
                "mode": 0o440,
                "overwrite": true,
            }]
        }
    })
}
