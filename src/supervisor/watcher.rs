//! Background reconciliation of intended state against observed OS state.
//!
//! The watcher is a single cooperative task. Each pass first retries daemons
//! left pending by the previous pass, then scans for fresh deaths, so a
//! daemon observed dead in pass k is restarted in pass k+1 at the earliest.

use super::{MAX_FAILED_STARTS, SUPERVISOR, Supervisor};
use crate::daemon_status::DaemonStatus;
use crate::env;
use crate::error::DaemonError;
use tokio::task::JoinHandle;
use tokio::time;

impl Supervisor {
    pub(crate) fn spawn_watcher(&self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(*env::HELL_WATCHER_INTERVAL);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                SUPERVISOR.reconcile().await;
            }
        })
    }

    pub(crate) async fn reconcile(&self) {
        let daemons = self.daemons().await;

        for (name, daemon) in &daemons {
            let mut daemon = daemon.lock().await;
            if !daemon.status().is_pending() {
                continue;
            }
            if daemon.failed_starts() >= MAX_FAILED_STARTS {
                warn!(
                    "{}",
                    DaemonError::RestartBudgetExhausted {
                        name: name.clone(),
                        failed: daemon.failed_starts(),
                    }
                );
                daemon.set_status(DaemonStatus::Error);
                continue;
            }
            info!("restarting daemon '{name}'");
            if let Err(err) = daemon.start().await {
                error!("failed to restart daemon {name}: {err}");
            }
        }

        let mut running = 0;
        for (name, daemon) in &daemons {
            let mut daemon = daemon.lock().await;
            if daemon.is_running() {
                running += 1;
                continue;
            }
            if daemon.status().is_running() {
                warn!("daemon {name} no longer running");
                if !daemon.config.keep_running {
                    daemon.set_status(DaemonStatus::Stopped);
                } else if daemon.failed_starts() < MAX_FAILED_STARTS {
                    daemon.set_status(DaemonStatus::Pending);
                } else {
                    warn!(
                        "{}",
                        DaemonError::RestartBudgetExhausted {
                            name: name.clone(),
                            failed: daemon.failed_starts(),
                        }
                    );
                    daemon.set_status(DaemonStatus::Error);
                }
            }
        }

        if running == 0 {
            // keep waiting; the operator may start daemons again
            warn!("no daemons running");
        }
    }
}
