use std::time::Duration;

use async_trait::async_trait;

use super::driver::{LanguageDriver, Prepared, create_workdir, write_source};
use super::{DriverError, Language};
use crate::sandbox::{LaunchSpec, ResourceLimits, SandboxLauncher};
use crate::submission::Submission;

const IMAGE: &str = "golang:1.19-alpine";

/// Compiles and runs in one step via `go run`, so no separate compile phase;
/// build failures surface on the run's stderr like any runtime error.
pub struct GolangDriver;

#[async_trait]
impl LanguageDriver for GolangDriver {
    fn language(&self) -> Language {
        Language::Golang
    }

    fn image(&self) -> &'static str {
        IMAGE
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn prepare(
        &self,
        submission: &Submission,
        _launcher: &dyn SandboxLauncher,
        _compile_deadline: Duration,
    ) -> Result<Prepared, DriverError> {
        let workdir = create_workdir(self.language())?;
        write_source(&workdir, "code.go", &submission.code)?;

        let run = LaunchSpec {
            image: IMAGE.to_string(),
            argv: vec![
                "go".to_string(),
                "run".to_string(),
                "/code/code.go".to_string(),
            ],
            mount_dir: workdir.path().to_path_buf(),
            limits: ResourceLimits::default(),
            // `go run` writes its build cache relative to the working dir
            workdir: Some("/code".to_string()),
        };

        Ok(Prepared {
            workdir,
            run,
            timeout: self.timeout(),
        })
    }
}
