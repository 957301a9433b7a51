//! Private per-daemon runtime environments and dependency installation.

use crate::Result;
use crate::cmd::{CommandSpec, EXECUTOR};
use crate::daemon::DaemonConfig;
use crate::env;
use crate::error::ProvisionError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DIR: &str = "env";
const PROVISION_TIMEOUT: Duration = Duration::from_secs(600);

/// Environment state for one daemon, rooted at `project_folder/env`.
#[derive(Debug)]
pub struct PyEnv {
    root: PathBuf,
    created: bool,
    installed: Vec<String>,
}

impl PyEnv {
    pub fn new(project_folder: &Path) -> Self {
        let root = project_folder.join(ENV_DIR);
        let created = root.exists();
        Self {
            root,
            created,
            installed: vec![],
        }
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn installed_requirements(&self) -> &[String] {
        &self.installed
    }

    /// Interpreter inside the private environment.
    pub fn python(&self) -> PathBuf {
        #[cfg(windows)]
        {
            self.root.join("Scripts").join("python.exe")
        }
        #[cfg(not(windows))]
        {
            self.root.join("bin").join("python")
        }
    }

    /// Create the environment. A pre-existing directory is left alone.
    pub async fn create_env(&mut self, name: &str) -> Result<()> {
        if self.root.exists() {
            warn!(
                "environment for {name} already exists at '{}'",
                self.root.display()
            );
            self.created = true;
            return Ok(());
        }
        debug!("creating environment for {name}");

        let spec = CommandSpec::new(env::python_command())
            .arg("-m")
            .arg("venv")
            .arg(self.root.display().to_string());
        match EXECUTOR
            .execute_blocking(&spec, false, PROVISION_TIMEOUT)
            .await
        {
            Ok((0, _)) => {}
            Ok((code, output)) => {
                error!("environment creation for {name} exited with code {code}: {output}");
                return Err(ProvisionError::EnvCreationFailed {
                    name: name.to_string(),
                }
                .into());
            }
            Err(err) => {
                error!("environment creation for {name} failed: {err}");
                return Err(ProvisionError::EnvCreationFailed {
                    name: name.to_string(),
                }
                .into());
            }
        }

        info!("created environment for {name}");
        self.created = true;
        Ok(())
    }

    /// Install the declared requirements, creating the private environment
    /// first when the config asks for one.
    pub async fn install_requirements(&mut self, config: &DaemonConfig) -> Result<()> {
        let name = &config.name;
        let Some(requirements) = &config.requirements_path else {
            warn!("install_requirements called but requirements_path is not set (daemon {name})");
            return Err(ProvisionError::RequirementsInstallFailed {
                name: name.to_string(),
            }
            .into());
        };
        if !requirements.exists() {
            warn!(
                "cannot install requirements for '{name}': file '{}' not found",
                requirements.display()
            );
            return Err(ProvisionError::RequirementsInstallFailed {
                name: name.to_string(),
            }
            .into());
        }

        if config.create_env && !self.created {
            self.create_env(name).await?;
        }

        let python = if self.created {
            self.python().display().to_string()
        } else {
            env::python_command()
        };
        let spec = CommandSpec::new(python)
            .arg("-m")
            .arg("pip")
            .arg("install")
            .arg("-r")
            .arg(requirements.display().to_string());
        match EXECUTOR
            .execute_blocking(&spec, false, PROVISION_TIMEOUT)
            .await
        {
            Ok((0, _)) => {}
            Ok((code, output)) => {
                error!("pip exited with code {code} for {name}: {output}");
                return Err(ProvisionError::RequirementsInstallFailed {
                    name: name.to_string(),
                }
                .into());
            }
            Err(err) => {
                error!("pip failed for {name}: {err}");
                return Err(ProvisionError::RequirementsInstallFailed {
                    name: name.to_string(),
                }
                .into());
            }
        }

        self.installed = read_requirements(requirements);
        info!(
            "installed requirements for {name}: {}",
            self.installed.join(", ")
        );
        Ok(())
    }
}

fn read_requirements(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|raw| {
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tmp: &Path, requirements: Option<PathBuf>) -> DaemonConfig {
        DaemonConfig {
            name: "test".to_string(),
            project_folder: tmp.to_path_buf(),
            main_file: tmp.join("main.py"),
            main_file_arguments: vec![],
            requirements_path: requirements,
            create_env: false,
            keep_running: false,
            source_url: None,
        }
    }

    #[tokio::test]
    async fn test_existing_env_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(ENV_DIR)).unwrap();
        let mut env = PyEnv::new(tmp.path());
        assert!(env.created());
        env.create_env("test").await.unwrap();
        assert!(env.created());
    }

    #[tokio::test]
    async fn test_requirements_path_unset() {
        let tmp = tempfile::tempdir().unwrap();
        let mut env = PyEnv::new(tmp.path());
        let err = env
            .install_requirements(&config(tmp.path(), None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("install requirements"));
    }

    #[tokio::test]
    async fn test_requirements_file_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut env = PyEnv::new(tmp.path());
        let missing = tmp.path().join("requirements.txt");
        let err = env
            .install_requirements(&config(tmp.path(), Some(missing)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("install requirements"));
        assert!(env.installed_requirements().is_empty());
    }

    #[test]
    fn test_read_requirements_filters_noise() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("requirements.txt");
        std::fs::write(&path, "requests\n\n# comment\nflask==3.0\n").unwrap();
        assert_eq!(read_requirements(&path), ["requests", "flask==3.0"]);
    }
}
