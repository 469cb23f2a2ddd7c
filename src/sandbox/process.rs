use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;

use super::{LaunchSpec, SandboxLauncher, SandboxProcess};

/// Launcher that runs commands directly on the host, without any isolation.
///
/// Resource limits in the launch spec are ignored; only the process lifecycle and
/// stdio plumbing behave as in the real sandbox. Intended for development
/// and test environments where docker is unavailable.
#[derive(Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// In-sandbox paths refer to the /code mount; on the bare host they are
    /// rewritten to the real working directory.
    fn host_argv(spec: &LaunchSpec) -> Vec<String> {
        let mount = spec.mount_dir.display().to_string();
        spec.argv
            .iter()
            .map(|arg| arg.replace("/code", &mount))
            .collect()
    }

    fn command(spec: &LaunchSpec) -> Result<Command> {
        let argv = Self::host_argv(spec);
        if argv.is_empty() {
            bail!("empty launch command");
        }
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(&spec.mount_dir);
        Ok(cmd)
    }
}

#[async_trait]
impl SandboxLauncher for ProcessLauncher {
    async fn pull_image_if_absent(&self, _image: &str) -> Result<()> {
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<SandboxProcess> {
        let child = Self::command(spec)?
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to start process")?;
        Ok(SandboxProcess::new(child))
    }

    async fn run_captured(&self, spec: &LaunchSpec) -> Result<std::process::Output> {
        Self::command(spec)?
            .output()
            .await
            .context("failed to run process")
    }
}
