// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster lifecycle CLI
//!
//! Thin layer over the orchestrator: each subcommand maps to one lifecycle
//! operation.
//!
//! Exit status:
//! - 0 when the run outcome is `succeeded`
//! - 1 for any other outcome
//! - 2 when the configuration is rejected (no provider call was made)
//!
//! Run with: cargo run --bin cim-cluster -- --config cluster.yaml create-cluster

use anyhow::{Context, Result};
use cim_cluster::{
    orchestrator::{Operation, Orchestrator, OrchestratorConfig},
    provider::{self, ProviderKind, ProviderOptions, VagrantConfig},
    topology, BootConfigCompiler, ClusterConfig, FccCompiler, JsonCompiler,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Provision and tear down multi-node Kubernetes clusters
#[derive(Debug, Parser)]
#[command(name = "cim-cluster", version, about)]
struct Cli {
    /// Cluster configuration document (YAML or JSON)
    #[arg(long, env = "CLUSTER_CONFIG", default_value = "cluster.yaml")]
    config: PathBuf,

    /// Concurrent provider calls within one node group
    #[arg(long, env = "CLUSTER_MAX_PARALLEL")]
    max_parallel: Option<usize>,

    /// Working directory of the Vagrant provider
    #[arg(long, env = "VAGRANT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Path of the fcct executable
    #[arg(long, env = "FCCT", default_value = "fcct")]
    fcct: PathBuf,

    /// Boot configuration format handed to the provider
    #[arg(long, value_enum, default_value_t = BootFormat::Fcc)]
    boot_format: BootFormat,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BootFormat {
    /// Ignition through fcct
    Fcc,
    /// Raw node variables as JSON
    Json,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Download and package provider base images
    PrepareProvider,
    /// Create every node in dependency order
    #[command(alias = "launch-cluster")]
    CreateCluster,
    /// Destroy every node in reverse dependency order
    DeleteCluster,
    /// Remove provider base images and packaging
    CleanProvider,
}

impl From<Command> for Operation {
    fn from(command: Command) -> Self {
        match command {
            Command::PrepareProvider => Operation::PrepareProvider,
            Command::CreateCluster => Operation::CreateCluster,
            Command::DeleteCluster => Operation::DeleteCluster,
            Command::CleanProvider => Operation::CleanProvider,
        }
    }
}

fn compiler_for(cli: &Cli, kind: ProviderKind, vagrant: &VagrantConfig) -> Arc<dyn BootConfigCompiler> {
    match cli.boot_format {
        BootFormat::Json => Arc::new(JsonCompiler),
        BootFormat::Fcc => {
            let compiler = FccCompiler::new().with_fcct(&cli.fcct);
            if kind == ProviderKind::Vagrant && vagrant.ssh_private_key_path.is_none() {
                Arc::new(compiler.with_overlay(provider::vagrant::vagrant_user_overlay()))
            } else {
                Arc::new(compiler)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let operation = Operation::from(cli.command);

    let topology = match ClusterConfig::from_path(&cli.config).and_then(|c| topology::resolve(&c)) {
        Ok(topology) => topology,
        Err(e) => {
            error!("Rejected configuration {}: {}", cli.config.display(), e);
            return Ok(ExitCode::from(2));
        }
    };

    let mut vagrant = VagrantConfig::from_env();
    if let Some(work_dir) = &cli.work_dir {
        vagrant.work_dir = work_dir.clone();
    }

    let compiler = compiler_for(&cli, topology.provider(), &vagrant);
    let provider = match provider::build(
        topology.provider(),
        topology.settings(),
        ProviderOptions { vagrant },
    ) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Provider unavailable: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    let config = cli
        .max_parallel
        .map(OrchestratorConfig::with_max_parallel)
        .unwrap_or_default();
    let orchestrator = Orchestrator::new(topology, provider, compiler).with_config(config);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; waiting for in-flight provider calls");
            cancel.cancel();
        }
    });

    info!("Running {} with config {}", operation, cli.config.display());
    let report = orchestrator.execute(operation).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode run report")?
        );
    } else {
        print!("{}", report);
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
