use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::driver::{LanguageDriver, Prepared, create_workdir, run_compile_step, write_source};
use super::{DriverError, Language};
use crate::sandbox::{LaunchSpec, ResourceLimits, SandboxLauncher};
use crate::submission::Submission;

const IMAGE: &str = "eclipse-temurin:11-jdk";

/// Class name used when the source declares none.
const DEFAULT_CLASS: &str = "Solution";

/// The JVM needs more headroom than the interpreters: a bigger heap, more
/// CPU, and enough pids for its service threads.
fn jvm_limits() -> ResourceLimits {
    ResourceLimits {
        memory_mb: 400,
        cpu_quota: 0.5,
        pids: 50,
        ..ResourceLimits::default()
    }
}

/// The declared class name is the compilation unit: the source file must be
/// named after it, and it is the run target.
pub fn extract_class_name(code: &str) -> String {
    let public_class = Regex::new(r"public\s+class\s+(\w+)").unwrap();
    if let Some(captures) = public_class.captures(code) {
        return captures[1].to_string();
    }

    let any_class = Regex::new(r"class\s+(\w+)").unwrap();
    if let Some(captures) = any_class.captures(code) {
        return captures[1].to_string();
    }

    DEFAULT_CLASS.to_string()
}

pub struct JavaDriver;

#[async_trait]
impl LanguageDriver for JavaDriver {
    fn language(&self) -> Language {
        Language::Java
    }

    fn image(&self) -> &'static str {
        IMAGE
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(100)
    }

    async fn prepare(
        &self,
        submission: &Submission,
        launcher: &dyn SandboxLauncher,
        compile_deadline: Duration,
    ) -> Result<Prepared, DriverError> {
        let class_name = extract_class_name(&submission.code);
        let workdir = create_workdir(self.language())?;
        write_source(&workdir, &format!("{class_name}.java"), &submission.code)?;

        let compile = LaunchSpec {
            image: IMAGE.to_string(),
            argv: vec!["javac".to_string(), format!("/code/{class_name}.java")],
            mount_dir: workdir.path().to_path_buf(),
            limits: jvm_limits(),
            workdir: None,
        };
        run_compile_step(launcher, &compile, compile_deadline).await?;

        let run = LaunchSpec {
            image: IMAGE.to_string(),
            argv: vec![
                "java".to_string(),
                "-XX:+TieredCompilation".to_string(),
                "-XX:TieredStopAtLevel=1".to_string(),
                "-Xms64m".to_string(),
                "-Xmx256m".to_string(),
                "-cp".to_string(),
                "/code".to_string(),
                class_name,
            ],
            mount_dir: workdir.path().to_path_buf(),
            limits: jvm_limits(),
            workdir: None,
        };

        Ok(Prepared {
            workdir,
            run,
            timeout: self.timeout(),
        })
    }
}
