use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use super::Language;
use crate::sandbox::{LaunchSpec, SandboxLauncher};
use crate::submission::Submission;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The compile step exited non-zero; `output` is the compiler's
    /// combined stdout/stderr.
    #[error("compilation error")]
    Compile { output: String },
    #[error("failed to prepare working directory: {0}")]
    Workspace(#[from] std::io::Error),
    #[error("sandbox launcher error: {0}")]
    Launcher(anyhow::Error),
}

/// A run ready to hand to the stream supervisor. Owns the working directory;
/// dropping it removes the directory on every exit path.
#[derive(Debug)]
pub struct Prepared {
    pub workdir: TempDir,
    pub run: LaunchSpec,
    pub timeout: Duration,
}

/// Per-language plugin: materialize a submission into a working directory,
/// compile if the language needs it, and assemble the run command.
#[async_trait]
pub trait LanguageDriver: Send + Sync {
    fn language(&self) -> Language;

    /// Sandbox image the language runs in; pre-pulled at startup.
    fn image(&self) -> &'static str;

    /// Wall-clock limit for the run phase.
    fn timeout(&self) -> Duration;

    /// Materialize the submission into a working directory and assemble the
    /// run command; `compile_deadline` bounds any compile phase.
    async fn prepare(
        &self,
        submission: &Submission,
        launcher: &dyn SandboxLauncher,
        compile_deadline: Duration,
    ) -> Result<Prepared, DriverError>;
}

/// Allocate a unique working directory for one run.
pub(super) fn create_workdir(language: Language) -> Result<TempDir, DriverError> {
    let workdir = tempfile::Builder::new()
        .prefix(&format!("codebox-{}-", language.as_str()))
        .tempdir()?;
    Ok(workdir)
}

pub(super) fn write_source(workdir: &TempDir, file_name: &str, code: &str) -> Result<(), DriverError> {
    std::fs::write(workdir.path().join(file_name), code)?;
    Ok(())
}

/// Run a compile command through the launcher and fail on non-zero exit with
/// the compiler's combined output.
pub(super) async fn run_compile_step(
    launcher: &dyn SandboxLauncher,
    spec: &LaunchSpec,
    deadline: Duration,
) -> Result<(), DriverError> {
    let result = tokio::time::timeout(deadline, launcher.run_captured(spec)).await;
    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(DriverError::Launcher(e)),
        Err(_) => {
            return Err(DriverError::Compile {
                output: format!("compilation timed out after {} seconds", deadline.as_secs()),
            });
        }
    };

    if !output.status.success() {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(DriverError::Compile { output: text });
    }
    Ok(())
}
