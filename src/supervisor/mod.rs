//! The singleton control plane: owns the daemon registry, global and
//! per-daemon lifecycle operations, and the background watcher.

mod watcher;

use crate::Result;
use crate::daemon::{Daemon, DaemonState};
use crate::daemon_status::DaemonStatus;
use crate::env;
use crate::error::DaemonError;
use crate::hell_yaml::HellYaml;
use crate::procs::PROCS;
use indexmap::IndexMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;

/// Consecutive failed starts before the watcher gives up on a daemon.
pub const MAX_FAILED_STARTS: u32 = 3;

pub type SharedDaemon = Arc<Mutex<Daemon>>;

pub struct Supervisor {
    registry: Mutex<IndexMap<String, SharedDaemon>>,
    running: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
    started_at: Mutex<Option<time::Instant>>,
}

pub static SUPERVISOR: Lazy<Supervisor> = Lazy::new(Supervisor::new);

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(IndexMap::new()),
            running: AtomicBool::new(false),
            watcher: Mutex::new(None),
            started_at: Mutex::new(None),
        }
    }

    /// Whether a global start is in effect.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Reset the registry from configuration, start every daemon
    /// concurrently and launch the watcher. Succeeds iff at least one
    /// daemon started.
    pub async fn start(&self) -> (bool, String) {
        if self.is_running() {
            return (false, "System is already running".to_string());
        }

        let config = match HellYaml::read(&*env::HELL_CONFIG_PATH) {
            Ok(config) => config,
            Err(err) => {
                error!("{err}");
                return (false, format!("Failed to load configuration: {err}"));
            }
        };
        let loaded = self.load_registry(config.resolve()).await;
        if loaded == 0 {
            return (false, "No daemons loaded".to_string());
        }
        info!("loaded {loaded} daemons");

        info!("starting daemons");
        let daemons = self.daemons().await;
        let total = daemons.len();
        let mut set = JoinSet::new();
        for (name, daemon) in daemons {
            set.spawn(async move {
                let mut daemon = daemon.lock().await;
                match daemon.start().await {
                    Ok(()) => true,
                    Err(err) => {
                        error!("error starting daemon {name}: {err}");
                        false
                    }
                }
            });
        }
        let mut errors = 0;
        while let Some(joined) = set.join_next().await {
            if !matches!(joined, Ok(true)) {
                errors += 1;
            }
        }

        if errors == total {
            warn!("no daemon could be started");
            return (false, "Can't start any daemon".to_string());
        }
        if errors == 0 {
            info!("system initialized and deployed all daemons ({total})");
        } else {
            info!(
                "system encountered {errors} failure(s) and deployed {} daemon(s)",
                total - errors
            );
        }

        *self.started_at.lock().await = Some(time::Instant::now());
        self.running.store(true, Ordering::SeqCst);
        *self.watcher.lock().await = Some(self.spawn_watcher());
        (true, "Successfully started system".to_string())
    }

    /// Cancel the watcher, then stop every running daemon. Children that
    /// resist the terminate/kill escalation get a raw SIGTERM and are
    /// reported without blocking their siblings.
    pub async fn stop(&self) -> (bool, String) {
        if !self.is_running() {
            return (false, "System is not running".to_string());
        }
        self.running.store(false, Ordering::SeqCst);

        if let Some(task) = self.watcher.lock().await.take() {
            info!("stopping watcher task");
            task.abort();
            let _ = task.await;
        }

        info!("stopping all running daemons");
        let mut resisted: Vec<String> = vec![];
        for (name, daemon) in self.daemons().await {
            let mut daemon = daemon.lock().await;
            if !daemon.is_running() {
                // errored daemons keep their status for operator inspection
                if daemon.status().is_running() || daemon.status().is_pending() {
                    daemon.set_status(DaemonStatus::Stopped);
                }
                continue;
            }
            let pid = daemon.pid();
            if let Err(err) = daemon.stop().await {
                error!("| daemon {name} [pid {pid:?}] failed to stop: {err}");
                if let Some(pid) = pid {
                    PROCS.send_sigterm(pid);
                    time::sleep(Duration::from_millis(200)).await;
                    if daemon.is_running() {
                        resisted.push(name);
                    } else {
                        daemon.set_status(DaemonStatus::Stopped);
                        info!("| daemon {name} [pid {pid}] stopped by SIGTERM");
                    }
                } else {
                    resisted.push(name);
                }
            }
        }

        if let Some(started_at) = self.started_at.lock().await.take() {
            info!("ending session, working time: {:?}", started_at.elapsed());
        }

        if resisted.is_empty() {
            info!("system killed all daemons");
            (true, "System stopped".to_string())
        } else {
            warn!(
                "system failed to kill {} daemon(s): {}",
                resisted.len(),
                resisted.iter().join(", ")
            );
            (
                true,
                format!(
                    "System stopped, {} daemon(s) resisted termination",
                    resisted.len()
                ),
            )
        }
    }

    pub async fn restart(&self, delay: Duration) -> (bool, String) {
        info!("restarting system");
        let (success, msg) = self.stop().await;
        if !success {
            return (false, msg);
        }
        time::sleep(delay).await;
        self.start().await
    }

    /// Start one daemon by name. A deliberate operator start of a daemon in
    /// ERROR re-arms its watcher budget.
    pub async fn start_daemon(&self, name: &str) -> Result<()> {
        let daemon = self.get(name).await.ok_or(DaemonError::NotFound {
            name: name.to_string(),
        })?;
        let mut daemon = daemon.lock().await;
        if daemon.status().is_error() {
            daemon.reset_failed_starts();
        }
        daemon.start().await
    }

    pub async fn stop_daemon(&self, name: &str) -> Result<()> {
        let daemon = self.get(name).await.ok_or(DaemonError::NotFound {
            name: name.to_string(),
        })?;
        let mut daemon = daemon.lock().await;
        daemon.stop().await
    }

    pub async fn restart_daemon(&self, name: &str) -> Result<()> {
        let daemon = self.get(name).await.ok_or(DaemonError::NotFound {
            name: name.to_string(),
        })?;
        let mut daemon = daemon.lock().await;
        daemon.stop().await?;
        daemon.start().await
    }

    pub async fn get(&self, name: &str) -> Option<SharedDaemon> {
        self.registry.lock().await.get(name).cloned()
    }

    pub async fn daemons(&self) -> Vec<(String, SharedDaemon)> {
        self.registry
            .lock()
            .await
            .iter()
            .map(|(name, daemon)| (name.clone(), daemon.clone()))
            .collect()
    }

    /// Frozen snapshots of the whole fleet.
    pub async fn get_all_daemons(&self) -> Vec<(String, DaemonStatus, DaemonState)> {
        let mut snapshots = vec![];
        for (name, daemon) in self.daemons().await {
            let mut daemon = daemon.lock().await;
            let state = daemon.state();
            snapshots.push((name, daemon.status(), state));
        }
        snapshots
    }

    pub async fn get_running_daemons(&self) -> Vec<String> {
        let mut running = vec![];
        for (name, daemon) in self.daemons().await {
            if daemon.lock().await.is_running() {
                running.push(name);
            }
        }
        running
    }

    pub async fn get_stopped_daemons(&self) -> Vec<String> {
        let mut stopped = vec![];
        for (name, daemon) in self.daemons().await {
            if !daemon.lock().await.is_running() {
                stopped.push(name);
            }
        }
        stopped
    }

    pub async fn search_by_pid(&self, pid: u32) -> Option<SharedDaemon> {
        for (_name, daemon) in self.daemons().await {
            if daemon.lock().await.pid() == Some(pid) {
                return Some(daemon);
            }
        }
        None
    }

    pub async fn search_by_file(&self, main_file: &Path) -> Option<SharedDaemon> {
        for (_name, daemon) in self.daemons().await {
            if daemon.lock().await.config.main_file == main_file {
                return Some(daemon);
            }
        }
        None
    }

    /// Rebuild the registry, enforcing unique names and unique main files.
    /// Returns how many daemons were admitted.
    pub(crate) async fn load_registry(&self, configs: Vec<crate::daemon::DaemonConfig>) -> usize {
        let mut registry = self.registry.lock().await;
        registry.clear();
        let mut seen_files = HashSet::new();
        for config in configs {
            if registry.contains_key(&config.name) {
                error!("daemon {} already exists", config.name);
                continue;
            }
            if !seen_files.insert(config.main_file.clone()) {
                error!(
                    "daemon {} shares its main file with another daemon",
                    config.name
                );
                continue;
            }
            let name = config.name.clone();
            registry.insert(name.clone(), Arc::new(Mutex::new(Daemon::new(config))));
            info!("loaded '{name}' daemon");
        }
        registry.len()
    }
}
