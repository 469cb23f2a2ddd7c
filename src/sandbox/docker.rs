use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{LaunchSpec, SandboxLauncher, SandboxProcess};

/// Period docker uses to account CPU quotas, in microseconds.
const CPU_PERIOD_US: u64 = 100_000;

/// Launcher backed by the docker CLI. Every run is a throwaway container
/// with the working directory bind-mounted at /code.
#[derive(Default)]
pub struct DockerLauncher;

impl DockerLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Argument vector for `docker run`. Interactive runs keep stdin open;
    /// compile runs do not.
    pub fn run_args(spec: &LaunchSpec, interactive: bool) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if interactive {
            args.push("-i".to_string());
        }
        if spec.limits.network_disabled {
            args.push("--network=none".to_string());
        }
        args.push(format!("--memory={}m", spec.limits.memory_mb));
        args.push(format!("--cpu-period={CPU_PERIOD_US}"));
        args.push(format!(
            "--cpu-quota={}",
            (spec.limits.cpu_quota * CPU_PERIOD_US as f64) as u64
        ));
        args.push(format!("--pids-limit={}", spec.limits.pids));
        args.push("--ulimit".to_string());
        args.push(format!(
            "nofile={}:{}",
            spec.limits.open_files, spec.limits.open_files
        ));
        args.push("-v".to_string());
        args.push(format!("{}:/code", spec.mount_dir.display()));
        if let Some(workdir) = &spec.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        args.push(spec.image.clone());
        args.extend(spec.argv.iter().cloned());
        args
    }
}

#[async_trait]
impl SandboxLauncher for DockerLauncher {
    async fn pull_image_if_absent(&self, image: &str) -> Result<()> {
        let inspect = Command::new("docker")
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("failed to spawn docker image inspect")?;
        if inspect.success() {
            return Ok(());
        }

        log::info!("pulling image {image}");
        let pull = Command::new("docker")
            .args(["pull", image])
            .output()
            .await
            .context("failed to spawn docker pull")?;
        if !pull.status.success() {
            anyhow::bail!(
                "docker pull {image} failed: {}",
                String::from_utf8_lossy(&pull.stderr).trim()
            );
        }
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<SandboxProcess> {
        let child = Command::new("docker")
            .args(Self::run_args(spec, true))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to start sandbox container")?;
        Ok(SandboxProcess::new(child))
    }

    async fn run_captured(&self, spec: &LaunchSpec) -> Result<std::process::Output> {
        Command::new("docker")
            .args(Self::run_args(spec, false))
            .output()
            .await
            .context("failed to run sandbox container")
    }
}

/// Check whether the docker CLI responds on this host.
pub fn docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
