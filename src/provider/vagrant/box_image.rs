// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fedora CoreOS base image download and vagrant-libvirt box packaging

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::commands;
use crate::errors::{ProviderError, ProviderResult};

/// Vagrantfile embedded in the box, selecting the libvirt KVM driver
const BOX_VAGRANTFILE: &str = r#"Vagrant.configure("2") do |config|
  config.vm.provider :libvirt do |libvirt|
    libvirt.driver = "kvm"
    libvirt.connect_via_ssh = false
    libvirt.username = "root"
    libvirt.storage_pool_name = "default"
  end
end
"#;

/// Virtual disk size declared in the box metadata, in GiB
const BOX_VIRTUAL_SIZE_GIB: u32 = 16;

/// Box name for an operating system version
pub(super) fn box_name(version: &str) -> String {
    format!("fedora-coreos-{}", version)
}

/// Compressed QEMU image file name for a version
pub(super) fn image_file_name(version: &str) -> String {
    format!("fedora-coreos-{}-qemu.x86_64.qcow2.xz", version)
}

/// Download URL of the compressed QEMU image
pub(super) fn image_url(base_url: &str, version: &str) -> String {
    format!(
        "{}/{}/x86_64/{}",
        base_url.trim_end_matches('/'),
        version,
        image_file_name(version)
    )
}

/// Stream `url` into `destination`, bounded by `limit`
///
/// Writes to a temporary sibling first so an interrupted download never
/// looks complete.
pub(super) async fn download(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    limit: Duration,
) -> ProviderResult<()> {
    info!("Downloading {}...", url);
    let started = Instant::now();
    let partial = destination.with_extension("partial");

    let transfer = async {
        let mut response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::Transient(format!("download of {} failed: {}", url, e)))?;

        let mut file = tokio::fs::File::create(&partial).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::Transient(format!("download of {} failed: {}", url, e)))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<(), ProviderError>(())
    };

    match tokio::time::timeout(limit, transfer).await {
        Err(_) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(ProviderError::timeout(format!("download {}", url), started.elapsed()))
        }
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
        Ok(Ok(())) => {
            tokio::fs::rename(&partial, destination).await?;
            Ok(())
        }
    }
}

/// Decompress an `.xz` file next to itself, returning the decompressed path
pub(super) async fn decompress(compressed: &Path, limit: Duration) -> ProviderResult<PathBuf> {
    info!("Extracting {}...", compressed.display());
    let path = compressed.to_string_lossy().into_owned();
    commands::run("xz", &["--decompress", "--keep", "--force", &path], None, limit).await?;
    Ok(compressed.with_extension(""))
}

/// Package a QEMU image as a vagrant-libvirt box (gzip-compressed tarball)
pub(super) async fn package(image: &Path, box_path: &Path) -> ProviderResult<()> {
    info!("Packaging {}...", box_path.display());
    let image = image.to_path_buf();
    let box_path = box_path.to_path_buf();

    tokio::task::spawn_blocking(move || write_box(&image, &box_path))
        .await
        .map_err(|e| ProviderError::Transient(format!("packaging task failed: {}", e)))?
}

fn write_box(image: &Path, box_path: &Path) -> ProviderResult<()> {
    let partial = box_path.with_extension("partial");
    let file = std::fs::File::create(&partial)?;
    let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    archive.append_path_with_name(image, "box.img")?;

    let metadata = json!({
        "provider": "libvirt",
        "format": "qcow2",
        "virtual_size": BOX_VIRTUAL_SIZE_GIB,
    });
    let metadata = serde_json::to_vec(&metadata)
        .map_err(|e| ProviderError::Transient(format!("box metadata: {}", e)))?;
    append_bytes(&mut archive, "metadata.json", &metadata)?;
    append_bytes(&mut archive, "Vagrantfile", BOX_VAGRANTFILE.as_bytes())?;

    archive.into_inner()?.finish()?;
    std::fs::rename(&partial, box_path)?;
    Ok(())
}

fn append_bytes<W: std::io::Write>(
    archive: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );
    header.set_cksum();
    archive.append_data(&mut header, name, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    #[test]
    fn test_image_url() {
        assert_eq!(
            image_url(super::super::DEFAULT_IMAGE_BASE_URL, "31.20200323.3.2"),
            "https://builds.coreos.fedoraproject.org/prod/streams/stable/builds/31.20200323.3.2/x86_64/fedora-coreos-31.20200323.3.2-qemu.x86_64.qcow2.xz"
        );
    }

    #[test]
    fn test_box_contents() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("disk.qcow2");
        std::fs::write(&image, b"qcow2-bytes").unwrap();
        let box_path = dir.path().join("test.box");

        write_box(&image, &box_path).unwrap();

        let file = std::fs::File::open(&box_path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Vagrantfile", "box.img", "metadata.json"]);
        assert!(!box_path.with_extension("partial").exists());
    }
}
