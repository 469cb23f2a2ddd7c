mod docker;
mod process;

pub use docker::DockerLauncher;
pub use process::ProcessLauncher;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};

/// Resource caps attached to every run command. Enforcement belongs to the
/// launcher; the core only guarantees the caps are present in the launch
/// vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    /// Fraction of one CPU, e.g. 0.1 for 10%
    pub cpu_quota: f64,
    pub pids: u64,
    pub open_files: u64,
    pub network_disabled: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 100,
            cpu_quota: 0.1,
            pids: 20,
            open_files: 64,
            network_disabled: true,
        }
    }
}

/// Everything a launcher needs to start one sandboxed command: the image,
/// the in-sandbox argv, the host directory mounted at /code, and the caps.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub image: String,
    pub argv: Vec<String>,
    pub mount_dir: PathBuf,
    pub limits: ResourceLimits,
    /// Working directory inside the sandbox, when the command needs one
    pub workdir: Option<String>,
}

/// A live sandboxed process with attachable stdio pipes.
pub struct SandboxProcess {
    child: Child,
}

impl SandboxProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// SIGKILL-equivalent; best effort, the process may already be gone.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            log::debug!("failed to kill sandbox process: {e}");
        }
    }
}

/// The isolation primitive the engine runs on. Language drivers and the
/// stream supervisor depend on this interface only, so the container CLI can
/// be swapped for any other isolation mechanism.
#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    /// Make sure the image is locally available before first use.
    async fn pull_image_if_absent(&self, image: &str) -> Result<()>;

    /// Start the command with piped stdin/stdout/stderr.
    async fn launch(&self, spec: &LaunchSpec) -> Result<SandboxProcess>;

    /// Run the command to completion and capture its combined output. Used
    /// for compile phases, which never need interactive stdin.
    async fn run_captured(&self, spec: &LaunchSpec) -> Result<std::process::Output>;
}

/// Pick the launcher for this host, the same way the execution mode is
/// chosen at startup: full isolation when docker is present, a plain process
/// launcher for trusted development environments otherwise.
pub fn create_launcher() -> Arc<dyn SandboxLauncher> {
    let no_sandbox = std::env::var("NO_SANDBOX").unwrap_or_default() == "1";

    if no_sandbox || !docker::docker_available() {
        log::warn!("creating ProcessLauncher (NO_SANDBOX mode)");
        log::warn!("ProcessLauncher provides NO isolation - use only in trusted environments");
        Arc::new(ProcessLauncher::new())
    } else {
        log::info!("creating DockerLauncher (full isolation mode)");
        Arc::new(DockerLauncher::new())
    }
}
