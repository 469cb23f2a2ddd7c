use std::time::Duration;

use async_trait::async_trait;

use super::driver::{LanguageDriver, Prepared, create_workdir, run_compile_step, write_source};
use super::{DriverError, Language};
use crate::sandbox::{LaunchSpec, ResourceLimits, SandboxLauncher};
use crate::submission::Submission;

const IMAGE: &str = "gcc:latest";

/// Shared driver for the gcc-toolchain languages; C and C++ differ only in
/// source filename and compiler binary.
pub struct GccDriver {
    language: Language,
    compiler: &'static str,
    source_name: &'static str,
}

pub static C_DRIVER: GccDriver = GccDriver {
    language: Language::C,
    compiler: "gcc",
    source_name: "code.c",
};

pub static CPP_DRIVER: GccDriver = GccDriver {
    language: Language::Cpp,
    compiler: "g++",
    source_name: "code.cpp",
};

#[async_trait]
impl LanguageDriver for GccDriver {
    fn language(&self) -> Language {
        self.language
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
        launcher: &dyn SandboxLauncher,
        compile_deadline: Duration,
    ) -> Result<Prepared, DriverError> {
        let workdir = create_workdir(self.language)?;
        write_source(&workdir, self.source_name, &submission.code)?;

        let compile = LaunchSpec {
            image: IMAGE.to_string(),
            argv: vec![
                self.compiler.to_string(),
                "-o".to_string(),
                "/code/program".to_string(),
                format!("/code/{}", self.source_name),
            ],
            mount_dir: workdir.path().to_path_buf(),
            limits: ResourceLimits::default(),
            workdir: None,
        };
        run_compile_step(launcher, &compile, compile_deadline).await?;

        let run = LaunchSpec {
            image: IMAGE.to_string(),
            argv: vec!["/code/program".to_string()],
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ProcessLauncher;

    // `true` stands in for the compiler; the launcher rewrites /code paths
    // onto the host, so the argv just needs to exit zero.
    struct NoopCompile;

    #[async_trait]
    impl SandboxLauncher for NoopCompile {
        async fn pull_image_if_absent(&self, _image: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn launch(
            &self,
            spec: &LaunchSpec,
        ) -> anyhow::Result<crate::sandbox::SandboxProcess> {
            ProcessLauncher::new().launch(spec).await
        }
        async fn run_captured(&self, _spec: &LaunchSpec) -> anyhow::Result<std::process::Output> {
            tokio::process::Command::new("true")
                .output()
                .await
                .map_err(Into::into)
        }
    }

    #[tokio::test]
    async fn test_c_and_cpp_differ_only_in_toolchain() {
        let c_sub = Submission::new(Language::C, "int main(){return 0;}".to_string(), None);
        let cpp_sub = Submission::new(Language::Cpp, "int main(){return 0;}".to_string(), None);

        let c = C_DRIVER.prepare(&c_sub, &NoopCompile, Duration::from_secs(30)).await.unwrap();
        let cpp = CPP_DRIVER.prepare(&cpp_sub, &NoopCompile, Duration::from_secs(30)).await.unwrap();

        assert!(c.workdir.path().join("code.c").exists());
        assert!(cpp.workdir.path().join("code.cpp").exists());
        assert_eq!(c.run.argv, vec!["/code/program"]);
        assert_eq!(cpp.run.argv, vec!["/code/program"]);
        assert_eq!(c.run.image, IMAGE);
    }
}
