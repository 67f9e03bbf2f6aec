// Copyright (c) 2025 - Cowboy AI, Inc.
//! Vagrant provider driver

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{box_image, commands, VagrantConfig};
use crate::compiler::BootConfig;
use crate::config::ClusterSettings;
use crate::errors::{ProviderError, ProviderResult};
use crate::provider::{NodeHandle, Provider, ProviderKind};
use crate::render::NodeSpec;

const BOX_SYMLINK: &str = "fedora-coreos.box";
const IGNITION_FILE: &str = "ignition.json";

/// Provider running nodes as Vagrant-managed libvirt machines
#[derive(Debug, Clone)]
pub struct VagrantProvider {
    config: VagrantConfig,
    operating_system_version: String,
    client: reqwest::Client,
}

impl VagrantProvider {
    /// Create a driver for the cluster's operating system version
    pub fn new(config: VagrantConfig, settings: &ClusterSettings) -> Self {
        Self {
            config,
            operating_system_version: settings.operating_system_version.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Driver settings
    pub fn config(&self) -> &VagrantConfig {
        &self.config
    }

    fn box_path(&self) -> PathBuf {
        self.config
            .boxes_dir()
            .join(format!("{}.box", box_image::box_name(&self.operating_system_version)))
    }

    async fn refresh_symlink(&self, target: &Path) -> ProviderResult<()> {
        let link = self.config.boxes_dir().join(BOX_SYMLINK);
        info!("Updating symbolic link {}...", link.display());
        remove_file_if_present(&link).await?;
        #[cfg(unix)]
        tokio::fs::symlink(target, &link).await?;
        #[cfg(not(unix))]
        tokio::fs::copy(target, &link).await.map(|_| ())?;
        Ok(())
    }

    fn vagrantfile(&self, node: &NodeSpec, box_path: &Path, ignition: &Path) -> String {
        render_vagrantfile(&VagrantfileParams {
            box_name: &box_image::box_name(&self.operating_system_version),
            box_path,
            ignition,
            node,
            libvirt_network: &self.config.libvirt_network,
            ssh_private_key_path: self.config.ssh_private_key_path.as_deref(),
        })
    }
}

struct VagrantfileParams<'a> {
    box_name: &'a str,
    box_path: &'a Path,
    ignition: &'a Path,
    node: &'a NodeSpec,
    libvirt_network: &'a str,
    ssh_private_key_path: Option<&'a Path>,
}

fn render_vagrantfile(params: &VagrantfileParams<'_>) -> String {
    let node = params.node;
    let ssh = match params.ssh_private_key_path {
        Some(key) => format!(
            "  config.ssh.username = \"core\"\n  config.ssh.private_key_path = \"{}\"\n",
            key.display()
        ),
        None => String::new(),
    };
    format!(
        r#"Vagrant.configure("2") do |config|
  config.vm.box = "{box_name}"
  config.vm.box_url = "file://{box_path}"
  config.vm.hostname = "{hostname}"
  config.vm.synced_folder ".", "/vagrant", disabled: true
{ssh}  config.vm.network :private_network,
    ip: "{address}",
    libvirt__network_name: "{network}"
  config.vm.provider :libvirt do |libvirt|
    libvirt.cpus = {cpus}
    libvirt.memory = {memory}
    libvirt.qemuargs :value => "-fw_cfg"
    libvirt.qemuargs :value => "name=opt/com.coreos/config,file={ignition}"
  end
end
"#,
        box_name = params.box_name,
        box_path = params.box_path.display(),
        hostname = node.hostname,
        ssh = ssh,
        address = node.address,
        network = params.libvirt_network,
        cpus = node.resources.cpus,
        memory = node.resources.memory_mib,
        ignition = params.ignition.display(),
    )
}

async fn remove_file_if_present(path: &Path) -> ProviderResult<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

async fn remove_dir_if_present(path: &Path) -> ProviderResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

async fn absolute(path: &Path) -> ProviderResult<PathBuf> {
    Ok(tokio::fs::canonicalize(path).await?)
}

async fn write_ignition(path: &Path, boot_config: &BootConfig) -> ProviderResult<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(boot_config.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl Provider for VagrantProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vagrant
    }

    async fn prepare(&self) -> ProviderResult<()> {
        let boxes = self.config.boxes_dir();
        let images = self.config.images_dir();
        tokio::fs::create_dir_all(&boxes).await?;
        tokio::fs::create_dir_all(&images).await?;

        let box_path = self.box_path();
        if tokio::fs::try_exists(&box_path).await? {
            info!("Box {} already packaged, skipping download", box_path.display());
        } else {
            let version = &self.operating_system_version;
            let compressed = images.join(box_image::image_file_name(version));
            let image = compressed.with_extension("");

            if !tokio::fs::try_exists(&image).await? {
                if !tokio::fs::try_exists(&compressed).await? {
                    let url = box_image::image_url(&self.config.image_base_url, version);
                    box_image::download(&self.client, &url, &compressed, self.config.download_timeout)
                        .await?;
                }
                box_image::decompress(&compressed, self.config.command_timeout).await?;
            }

            box_image::package(&image, &box_path).await?;
        }

        self.refresh_symlink(&absolute(&box_path).await?).await?;
        info!("Vagrant ready to launch");
        Ok(())
    }

    async fn create(&self, node: &NodeSpec, boot_config: &BootConfig) -> ProviderResult<NodeHandle> {
        let box_path = self.config.boxes_dir().join(BOX_SYMLINK);
        if !tokio::fs::try_exists(&box_path).await? {
            return Err(ProviderError::Unavailable(
                "no packaged box; run prepare-provider first".to_string(),
            ));
        }

        let dir = self.config.machine_dir(&node.id);
        if tokio::fs::try_exists(&dir).await? {
            let state = commands::vagrant_state(&dir, self.config.command_timeout).await?;
            match state.as_deref() {
                Some("running") => {
                    return Err(ProviderError::Conflict(format!(
                        "machine {} is already running",
                        node.id
                    )))
                }
                state => info!(
                    "Resuming machine {} (state {})",
                    node.id,
                    state.unwrap_or("unknown")
                ),
            }
        }

        tokio::fs::create_dir_all(&dir).await?;
        let dir = absolute(&dir).await?;
        let ignition = dir.join(IGNITION_FILE);
        write_ignition(&ignition, boot_config).await?;

        let vagrantfile = self.vagrantfile(node, &absolute(&box_path).await?, &ignition);
        tokio::fs::write(dir.join("Vagrantfile"), vagrantfile).await?;

        debug!("Booting {} at {}", node.id, node.address);
        commands::vagrant_up(&dir, self.config.command_timeout).await?;
        Ok(NodeHandle::new(node.id.clone()))
    }

    async fn destroy(&self, handle: &NodeHandle) -> ProviderResult<()> {
        let dir = self.config.machine_dir(&handle.id);
        if !tokio::fs::try_exists(&dir).await? {
            debug!("Machine {} already absent", handle.id);
            return Ok(());
        }

        if tokio::fs::try_exists(dir.join("Vagrantfile")).await? {
            commands::vagrant_destroy(&dir, self.config.command_timeout).await?;
        } else {
            warn!("Machine directory {} has no Vagrantfile", dir.display());
        }
        remove_dir_if_present(&dir).await
    }

    async fn clean(&self) -> ProviderResult<()> {
        info!("Cleaning {}...", self.config.work_dir.display());
        remove_dir_if_present(&self.config.boxes_dir()).await?;
        remove_dir_if_present(&self.config.images_dir()).await
    }
}
