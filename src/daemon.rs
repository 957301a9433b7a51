//! One supervised daemon: immutable configuration, the live process handle,
//! and the state machine tying them together.

use crate::Result;
use crate::cmd::CommandSpec;
use crate::daemon_status::DaemonStatus;
use crate::env;
use crate::error::{DaemonError, ExecError, ProvisionError};
use crate::isolation::ISOLATION;
use crate::procs::ProcHandle;
use crate::provision::{PyEnv, sync_source};
use crate::supervisor::MAX_FAILED_STARTS;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::Duration;

/// Grace window between terminate and kill when stopping.
const STOP_GRACE: Duration = Duration::from_secs(3);
/// How long a fresh child is probed before the start counts as successful.
const SPAWN_PROBE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DaemonConfig {
    pub name: String,
    pub project_folder: PathBuf,
    pub main_file: PathBuf,
    #[serde(default)]
    pub main_file_arguments: Vec<String>,
    #[serde(default)]
    pub requirements_path: Option<PathBuf>,
    #[serde(default)]
    pub create_env: bool,
    #[serde(default)]
    pub keep_running: bool,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Value-typed observation snapshot. Never aliases live state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DaemonState {
    pub running: bool,
    pub pid: i32,
    pub memory_mb: f64,
    pub cpu_percent: f32,
    pub started_at: Option<DateTime<Local>>,
    pub starts_count: u32,
    pub start_attempts: u32,
    pub failed_starts: u32,
    pub env_created: bool,
    pub installed_requirements: Vec<String>,
}

#[derive(Debug)]
pub struct Daemon {
    pub config: DaemonConfig,
    handle: Option<ProcHandle>,
    status: DaemonStatus,
    env: PyEnv,
    started_at: Option<DateTime<Local>>,
    starts_count: u32,
    start_attempts: u32,
    failed_starts: u32,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        let env = PyEnv::new(&config.project_folder);
        Self {
            config,
            handle: None,
            status: DaemonStatus::Stopped,
            env,
            started_at: None,
            starts_count: 0,
            start_attempts: 0,
            failed_starts: 0,
        }
    }

    /// Spawn the daemon's child process, provisioning sources and
    /// dependencies first when the configuration asks for them.
    /// Provisioning is attempted at most once per call.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            let pid = self.handle.as_ref().map(|h| h.pid()).unwrap_or_default();
            return Err(DaemonError::AlreadyRunning {
                name: self.config.name.clone(),
                pid,
            }
            .into());
        }
        info!("starting {}", self.config.name);
        self.start_attempts += 1;

        if let Some(source) = self.config.source_url.clone() {
            let parent = self
                .config
                .project_folder
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| self.config.project_folder.clone());
            // the tree materializes at parent/<dir name>, i.e. the project folder
            let target = self
                .config
                .project_folder
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(&self.config.name)
                .to_string();
            if !sync_source(&target, &source, &parent, false).await {
                self.fail_start();
                return Err(ProvisionError::SourceSyncFailed {
                    name: self.config.name.clone(),
                    source_url: source,
                }
                .into());
            }
        }

        if self.config.requirements_path.is_some() && self.env.installed_requirements().is_empty()
        {
            let config = self.config.clone();
            if let Err(err) = self.env.install_requirements(&config).await {
                error!(
                    "failed to start {} [requirements not installed]",
                    self.config.name
                );
                self.fail_start();
                return Err(err);
            }
        }

        let spec = self.launch_spec();
        let mut handle = match ISOLATION.spawn(&spec, &self.config.project_folder) {
            Ok(handle) => handle,
            Err(err) => {
                error!("failed to spawn {}: {err}", self.config.name);
                self.fail_start();
                return Err(err);
            }
        };

        // a child that is already gone counts as a failed start
        tokio::time::sleep(SPAWN_PROBE).await;
        if !handle.is_running() {
            error!("failed to start {} [process exited immediately]", self.config.name);
            self.fail_start();
            return Err(ExecError::SpawnFailed {
                command: spec.to_string(),
                details: "process exited immediately".to_string(),
            }
            .into());
        }

        info!("started {} with pid {}", self.config.name, handle.pid());
        self.handle = Some(handle);
        self.status = DaemonStatus::Running;
        self.started_at = Some(Local::now());
        self.starts_count += 1;
        Ok(())
    }

    /// Terminate the child, escalating to kill after a grace window.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(DaemonError::NotRunning {
                name: self.config.name.clone(),
            }
            .into());
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(DaemonError::NotRunning {
                name: self.config.name.clone(),
            }
            .into());
        };
        let pid = handle.pid();
        info!("stopping {} [pid {pid}]", self.config.name);

        if handle.shutdown(STOP_GRACE).await {
            info!("stopped {} [pid {pid}]", self.config.name);
            self.handle = None;
            self.status = DaemonStatus::Stopped;
            Ok(())
        } else {
            error!("failed to stop {} [pid {pid}]", self.config.name);
            Err(DaemonError::StopFailed {
                name: self.config.name.clone(),
                pid,
            }
            .into())
        }
    }

    /// True iff a process handle exists and the OS reports it alive.
    pub fn is_running(&mut self) -> bool {
        match self.handle.as_mut() {
            Some(handle) => handle.is_running(),
            None => false,
        }
    }

    pub fn status(&self) -> DaemonStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: DaemonStatus) {
        self.status = status;
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid())
    }

    pub fn starts_count(&self) -> u32 {
        self.starts_count
    }

    pub fn start_attempts(&self) -> u32 {
        self.start_attempts
    }

    pub fn failed_starts(&self) -> u32 {
        self.failed_starts
    }

    /// Re-arms the watcher budget; only lifetime counters survive.
    pub(crate) fn reset_failed_starts(&mut self) {
        self.failed_starts = 0;
    }

    pub fn state(&mut self) -> DaemonState {
        let running = self.is_running();
        let (pid, memory_mb, cpu_percent) = match (&self.handle, running) {
            (Some(handle), true) => (
                handle.pid() as i32,
                handle.memory_mb(),
                handle.cpu_percent(),
            ),
            _ => (-1, 0.0, 0.0),
        };
        DaemonState {
            running,
            pid,
            memory_mb,
            cpu_percent,
            started_at: self.started_at,
            starts_count: self.starts_count,
            start_attempts: self.start_attempts,
            failed_starts: self.failed_starts,
            env_created: self.env.created(),
            installed_requirements: self.env.installed_requirements().to_vec(),
        }
    }

    fn launch_spec(&self) -> CommandSpec {
        let python = if self.env.created() {
            self.env.python().display().to_string()
        } else {
            env::python_command()
        };
        CommandSpec::new(python)
            .arg(self.config.main_file.display().to_string())
            .args(self.config.main_file_arguments.iter().cloned())
    }

    fn fail_start(&mut self) {
        self.failed_starts += 1;
        self.status = if !self.config.keep_running {
            DaemonStatus::Stopped
        } else if self.failed_starts >= MAX_FAILED_STARTS {
            DaemonStatus::Error
        } else {
            DaemonStatus::Pending
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(tmp: &std::path::Path, keep_running: bool) -> DaemonConfig {
        DaemonConfig {
            name: "test".to_string(),
            project_folder: tmp.to_path_buf(),
            main_file: tmp.join("main.py"),
            main_file_arguments: vec!["--flag".to_string()],
            requirements_path: None,
            create_env: false,
            keep_running,
            source_url: None,
        }
    }

    #[tokio::test]
    async fn test_stop_requires_running() {
        let tmp = tempfile::tempdir().unwrap();
        let mut daemon = Daemon::new(test_config(tmp.path(), false));
        let err = daemon.stop().await.unwrap_err();
        assert!(err.to_string().contains("is not running"));
        assert_eq!(daemon.status(), DaemonStatus::Stopped);
    }

    #[tokio::test]
    async fn test_missing_requirements_fails_start() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path(), false);
        config.requirements_path = Some(tmp.path().join("requirements.txt"));
        let mut daemon = Daemon::new(config);

        let err = daemon.start().await.unwrap_err();
        assert!(err.to_string().contains("install requirements"));
        assert_eq!(daemon.start_attempts(), 1);
        assert_eq!(daemon.failed_starts(), 1);
        assert_eq!(daemon.starts_count(), 0);
        assert_eq!(daemon.status(), DaemonStatus::Stopped);
    }

    #[tokio::test]
    async fn test_failed_start_with_keep_running_goes_pending() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path(), true);
        config.requirements_path = Some(tmp.path().join("requirements.txt"));
        let mut daemon = Daemon::new(config);

        assert!(daemon.start().await.is_err());
        assert_eq!(daemon.status(), DaemonStatus::Pending);

        assert!(daemon.start().await.is_err());
        assert!(daemon.start().await.is_err());
        assert_eq!(daemon.failed_starts(), MAX_FAILED_STARTS);
        assert_eq!(daemon.status(), DaemonStatus::Error);
    }

    #[tokio::test]
    async fn test_snapshot_of_stopped_daemon() {
        let tmp = tempfile::tempdir().unwrap();
        let mut daemon = Daemon::new(test_config(tmp.path(), false));
        let state = daemon.state();
        assert!(!state.running);
        assert_eq!(state.pid, -1);
        assert_eq!(state.starts_count, 0);
        assert!(state.started_at.is_none());
        assert!(state.installed_requirements.is_empty());
    }

    #[test]
    fn test_counters_invariant_on_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let mut daemon = Daemon::new(test_config(tmp.path(), true));
        daemon.start_attempts = 5;
        daemon.starts_count = 2;
        daemon.failed_starts = 3;
        daemon.reset_failed_starts();
        assert_eq!(daemon.failed_starts(), 0);
        assert_eq!(daemon.start_attempts(), 5);
        assert_eq!(daemon.starts_count(), 2);
        assert!(daemon.starts_count() <= daemon.start_attempts());
    }
}
