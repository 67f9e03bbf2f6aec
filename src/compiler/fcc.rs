// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fedora CoreOS Config compiler
//!
//! Builds an FCC document from a node's variables, merges role overlays
//! and caller-supplied overlays into it, and transpiles the result to
//! Ignition JSON with `fcct --pretty --strict`.
//!
//! # Merge semantics
//!
//! - maps merge recursively
//! - arrays concatenate
//! - any other value is replaced by the overlay

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use super::{BootConfig, BootConfigCompiler};
use crate::domain::NodeRole;
use crate::errors::{CompileError, CompileResult};
use crate::render::Variables;

const FCC_VARIANT: &str = "fcos";
const FCC_VERSION: &str = "1.0.0";

const KUBELET_UNIT: &str = "[Unit]
Description=Kubernetes Kubelet
Wants=network-online.target
After=network-online.target

[Service]
ExecStartPre=/usr/bin/tar -xzf /opt/cni/bin/cni-plugins.tar.gz -C /opt/cni/bin
ExecStart=/opt/kubernetes/bin/kubelet --config=/etc/kubernetes/kubelet.yaml --hostname-override=%H
Restart=always
RestartSec=10

[Install]
WantedBy=multi-user.target
";

/// Compiler producing Ignition JSON through `fcct`
#[derive(Debug, Clone)]
pub struct FccCompiler {
    fcct: PathBuf,
    overlays: Vec<Value>,
    timeout: Duration,
}

impl Default for FccCompiler {
    fn default() -> Self {
        Self {
            fcct: PathBuf::from("fcct"),
            overlays: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl FccCompiler {
    /// Compiler using `fcct` from `PATH`
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `fcct` executable
    pub fn with_fcct(mut self, path: impl Into<PathBuf>) -> Self {
        self.fcct = path.into();
        self
    }

    /// Merge an extra overlay into every document
    pub fn with_overlay(mut self, overlay: Value) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Bound each transpiler run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The merged FCC document of one node, before transpilation
    pub fn document(&self, role: NodeRole, variables: &Variables) -> CompileResult<Value> {
        let mut document = base_document(role, variables)?;
        if let Some(overlay) = role_overlay(role, variables)? {
            merge_documents(&mut document, overlay);
        }
        for overlay in &self.overlays {
            merge_documents(&mut document, overlay.clone());
        }
        check_duplicate_paths(&document)?;
        Ok(document)
    }

    async fn transpile(&self, fcc: String) -> CompileResult<Vec<u8>> {
        let mut child = Command::new(&self.fcct)
            .args(["--pretty", "--strict"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CompileError::Transpiler(format!("failed to start {}: {}", self.fcct.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompileError::Transpiler("transpiler stdin unavailable".to_string()))?;
        let feed = async move {
            let result = stdin.write_all(fcc.as_bytes()).await;
            drop(stdin);
            result
        };

        let run = async move { tokio::join!(feed, child.wait_with_output()) };
        let (fed, output) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| CompileError::Transpiler(format!("timed out after {:?}", self.timeout)))?;

        let output = output.map_err(|e| CompileError::Transpiler(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("fcct failed: {}", stderr.trim());
            return Err(CompileError::Transpiler(stderr.trim().to_string()));
        }
        fed.map_err(|e| CompileError::Transpiler(e.to_string()))?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl BootConfigCompiler for FccCompiler {
    async fn compile(&self, role: NodeRole, variables: &Variables) -> CompileResult<BootConfig> {
        let document = self.document(role, variables)?;
        let fcc = serde_yaml::to_string(&document)?;
        debug!(
            "Transpiling {} bytes of FCC for {}",
            fcc.len(),
            variables.get("node_id").unwrap_or("node")
        );
        Ok(BootConfig::new(self.transpile(fcc).await?))
    }
}

/// Deep-merge `overlay` into `base`
pub fn merge_documents(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_documents(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(overlay)) => base.extend(overlay),
        (base, overlay) => *base = overlay,
    }
}

fn check_duplicate_paths(document: &Value) -> CompileResult<()> {
    let mut seen = BTreeSet::new();
    let files = document
        .pointer("/storage/files")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for file in files {
        if let Some(path) = file.get("path").and_then(Value::as_str) {
            if !seen.insert(path) {
                return Err(CompileError::DuplicatePath(path.to_string()));
            }
        }
    }
    Ok(())
}

fn file_from_content(path: &str, contents: impl Into<String>, mode: u32) -> Value {
    json!({
        "path": path,
        "contents": { "inline": contents.into() },
        "mode": mode,
        "overwrite": true,
    })
}

fn file_from_url(path: &str, url: String, mode: u32) -> Value {
    json!({
        "path": path,
        "contents": { "source": url },
        "mode": mode,
        "overwrite": true,
    })
}

fn node_role_label(role: NodeRole) -> &'static str {
    match role {
        NodeRole::QuorumStore => "etcd",
        NodeRole::ControlPlane => "master",
        other => other.as_str(),
    }
}

fn kubelet_configuration() -> Value {
    json!({
        "apiVersion": "kubelet.config.k8s.io/v1beta1",
        "kind": "KubeletConfiguration",
        "authentication": {
            "anonymous": { "enabled": true },
            "webhook": { "enabled": false },
        },
        "authorization": { "mode": "AlwaysAllow" },
        "cgroupDriver": "systemd",
        "staticPodPath": "/etc/kubernetes/pods/",
    })
}

fn base_document(role: NodeRole, variables: &Variables) -> CompileResult<Value> {
    let hostname = variables.require("hostname")?;
    let provider = variables.require("provider")?;
    let kubernetes_version = variables.require("kubernetes_version")?;
    let cni_version = variables.require("cni_plugins_version")?;
    let ssh_keys: Vec<&str> = variables
        .get("ssh_authorized_keys")
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();

    Ok(json!({
        "variant": FCC_VARIANT,
        "version": FCC_VERSION,
        "ignition": {},
        "passwd": {
            "users": [{ "name": "core", "ssh_authorized_keys": ssh_keys }]
        },
        "storage": {
            "directories": [
                { "path": "/etc/kubernetes/pods" },
                { "path": "/etc/kubernetes/tls" },
                { "path": "/opt/kubernetes/bin" },
                { "path": "/opt/cni/bin" },
            ],
            "files": [
                file_from_content("/etc/hostname", hostname, 0o644),
                file_from_content(
                    "/etc/profile.d/cloud_provider.sh",
                    format!("CLOUD_PROVIDER={}", provider),
                    0o644,
                ),
                file_from_content(
                    "/etc/profile.d/node_role.sh",
                    format!("NODE_ROLE={}", node_role_label(role)),
                    0o644,
                ),
                file_from_content(
                    "/etc/selinux/config",
                    "SELINUX=disabled\nSELINUXTYPE=targeted",
                    0o644,
                ),
                file_from_url(
                    "/opt/kubernetes/bin/kubelet",
                    format!(
                        "https://storage.googleapis.com/kubernetes-release/release/v{}/bin/linux/amd64/kubelet",
                        kubernetes_version
                    ),
                    0o755,
                ),
                file_from_content(
                    "/etc/kubernetes/kubelet.yaml",
                    serde_yaml::to_string(&kubelet_configuration())?,
                    0o600,
                ),
                file_from_url(
                    "/opt/cni/bin/cni-plugins.tar.gz",
                    format!(
                        "https://github.com/containernetworking/plugins/releases/download/v{0}/cni-plugins-linux-amd64-v{0}.tgz",
                        cni_version
                    ),
                    0o644,
                ),
            ],
        },
        "systemd": {
            "units": [{
                "name": "kubelet.service",
                "enabled": true,
                "contents": KUBELET_UNIT,
            }]
        },
    }))
}

fn role_overlay(role: NodeRole, variables: &Variables) -> CompileResult<Option<Value>> {
    match role {
        NodeRole::QuorumStore => {
            let pod = serde_yaml::to_string(&etcd_static_pod(variables)?)?;
            Ok(Some(json!({
                "storage": {
                    "directories": [{ "path": "/var/lib/etcd/data" }],
                    "files": [file_from_content("/etc/kubernetes/pods/etcd.yaml", pod, 0o644)],
                }
            })))
        }
        _ => Ok(None),
    }
}

/// Static pod running one etcd member of the quorum-store group
fn etcd_static_pod(variables: &Variables) -> CompileResult<Value> {
    let peers = variables.list("quorum_peers");
    if peers.is_empty() {
        return Err(CompileError::MissingVariable("quorum_peers".to_string()));
    }
    let etcd_version = variables.require("etcd_version")?;
    let token = variables.require("quorum_initial_cluster_token")?;
    let client_port: u16 = variables.parse("quorum_client_port")?;
    let peer_port: u16 = variables.parse("quorum_peer_port")?;
    let ca = variables.require("tls_ca_certificate")?;
    let certificate = variables.require("tls_certificate")?;
    let key = variables.require("tls_private_key")?;

    Ok(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "etcd",
            "namespace": "kube-system",
            "labels": { "static": "true", "app": "etcd" },
        },
        "spec": {
            "containers": [{
                "name": "etcd",
                "image": format!("gcr.io/etcd-development/etcd:v{}", etcd_version),
                "command": [
                    "etcd",
                    "--name=$(NODE_NAME)",
                    format!("--initial-advertise-peer-urls=https://$(HOST_IP):{}", peer_port),
                    format!("--listen-peer-urls=https://$(HOST_IP):{}", peer_port),
                    format!("--advertise-client-urls=https://$(HOST_IP):{}", client_port),
                    format!("--listen-client-urls=https://$(HOST_IP):{}", client_port),
                    format!("--initial-cluster={}", peers.join(",")),
                    "--initial-cluster-state=new",
                    format!("--initial-cluster-token={}", token),
                    format!("--cert-file={}", certificate),
                    format!("--key-file={}", key),
                    format!("--trusted-ca-file={}", ca),
                    format!("--peer-cert-file={}", certificate),
                    format!("--peer-key-file={}", key),
                    "--peer-client-cert-auth=true",
                    format!("--peer-trusted-ca-file={}", ca),
                    "--data-dir=/var/lib/etcd/data",
                    format!("--quota-backend-bytes={}", 8u64 * 1024 * 1024 * 1024),
                    "--auto-compaction-retention=5m",
                    "--logger=zap",
                ],
                "env": [
                    {
                        "name": "NODE_NAME",
                        "valueFrom": { "fieldRef": { "fieldPath": "spec.nodeName" } },
                    },
                    {
                        "name": "HOST_IP",
                        "valueFrom": { "fieldRef": { "fieldPath": "status.hostIP" } },
                    },
                ],
                "ports": [
                    { "name": "client", "containerPort": client_port, "protocol": "TCP", "hostPort": client_port },
                    { "name": "peer", "containerPort": peer_port, "protocol": "TCP", "hostPort": peer_port },
                ],
                "volumeMounts": [
                    { "name": "etcd-data-dir", "mountPath": "/var/lib/etcd/data" },
                    { "name": "etcd-tls-dir", "mountPath": "/etc/etcd/tls" },
                ],
            }],
            "hostNetwork": true,
            "volumes": [
                { "name": "etcd-data-dir", "hostPath": { "path": "/var/lib/etcd/data" } },
                { "name": "etcd-tls-dir", "hostPath": { "path": "/etc/etcd/tls" } },
            ],
        },
    }))
}
