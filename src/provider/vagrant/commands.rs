// Copyright (c) 2025 - Cowboy AI, Inc.
//! External command invocation with bounded run time

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error};

use crate::errors::{ProviderError, ProviderResult};

/// Run `program args…` in `dir`, returning stdout
///
/// The child is killed when `limit` elapses. A missing executable is
/// [`ProviderError::Unavailable`]; a non-zero exit is transient.
pub(super) async fn run(
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
    limit: Duration,
) -> ProviderResult<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let description = format!("{} {}", program, args.join(" "));
    debug!("Running {}", description);
    let started = Instant::now();

    let output = match tokio::time::timeout(limit, command.output()).await {
        Err(_) => return Err(ProviderError::timeout(description, started.elapsed())),
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(ProviderError::Unavailable(format!(
                "'{}' is not installed or not on PATH",
                program
            )))
        }
        Ok(result) => result?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} ({}): {}", description, output.status, stderr.trim());
        return Err(ProviderError::Transient(format!(
            "{} exited with {}: {}",
            description,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `vagrant up` for the machine in `dir`
pub(super) async fn vagrant_up(dir: &Path, limit: Duration) -> ProviderResult<()> {
    run("vagrant", &["up", "--provider", "libvirt"], Some(dir), limit).await?;
    Ok(())
}

/// `vagrant destroy --force` for the machine in `dir`
pub(super) async fn vagrant_destroy(dir: &Path, limit: Duration) -> ProviderResult<()> {
    run("vagrant", &["destroy", "--force"], Some(dir), limit).await?;
    Ok(())
}

/// Machine state reported by `vagrant status`, e.g. `running` or `not_created`
pub(super) async fn vagrant_state(dir: &Path, limit: Duration) -> ProviderResult<Option<String>> {
    let output = run("vagrant", &["status", "--machine-readable"], Some(dir), limit).await?;
    Ok(parse_machine_state(&output))
}

/// Extract the `state` field from `--machine-readable` output
///
/// Lines look like `timestamp,target,type,data`.
pub(super) fn parse_machine_state(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.splitn(4, ',');
        let (_, _, kind, data) = (fields.next()?, fields.next()?, fields.next()?, fields.next()?);
        (kind == "state").then(|| data.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_machine_state() {
        let output = "1589000000,default,metadata,provider,libvirt\n\
                      1589000000,default,provider-name,libvirt\n\
                      1589000000,default,state,running\n\
                      1589000000,default,state-human-short,running\n";
        assert_eq!(parse_machine_state(output).as_deref(), Some("running"));
    }

    #[test]
    fn test_parse_machine_state_missing() {
        assert_eq!(parse_machine_state("garbage"), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let err = run(
            "cim-cluster-no-such-program",
            &[],
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
