use std::time::Duration;

use async_trait::async_trait;

use super::driver::{LanguageDriver, Prepared, create_workdir, write_source};
use super::{DriverError, Language};
use crate::sandbox::{LaunchSpec, ResourceLimits, SandboxLauncher};
use crate::submission::Submission;

const IMAGE: &str = "node:16-alpine";

pub struct JavaScriptDriver;

#[async_trait]
impl LanguageDriver for JavaScriptDriver {
    fn language(&self) -> Language {
        Language::JavaScript
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
        write_source(&workdir, "code.js", &submission.code)?;

        let run = LaunchSpec {
            image: IMAGE.to_string(),
            argv: vec!["node".to_string(), "/code/code.js".to_string()],
            mount_dir: workdir.path().to_path_buf(),
            limits: ResourceLimits::default(),
            workdir: None,
        };

        Ok(Prepared {
            workdir,
            run,
            timeout: self.timeout(),
        })
    }
}
