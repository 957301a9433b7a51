//! Process-table observation and handles to spawned children.

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::ProcessesToUpdate;
use tokio::time;

/// Executable names daemons present as in the process table.
#[cfg(windows)]
pub const RUNTIME_NAMES: &[&str] = &["python.exe", "python3.exe", "pythonw.exe", "python"];
#[cfg(not(windows))]
pub const RUNTIME_NAMES: &[&str] = &["python3", "python"];

pub struct Procs {
    system: Mutex<sysinfo::System>,
}

pub static PROCS: Lazy<Procs> = Lazy::new(Procs::new);

impl Default for Procs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procs {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }

    fn lock_system(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        self.system.lock().unwrap_or_else(|poisoned| {
            warn!("System mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn refresh_processes(&self) {
        self.lock_system()
            .refresh_processes(ProcessesToUpdate::All, true);
    }

    pub fn refresh_pids(&self, pids: &[u32]) {
        let sysinfo_pids: Vec<sysinfo::Pid> =
            pids.iter().map(|p| sysinfo::Pid::from_u32(*p)).collect();
        self.lock_system()
            .refresh_processes(ProcessesToUpdate::Some(&sysinfo_pids), true);
    }

    /// Resource sample for a PID. Call after a refresh.
    pub fn get_stats(&self, pid: u32) -> Option<ProcessStats> {
        let system = self.lock_system();
        system
            .process(sysinfo::Pid::from_u32(pid))
            .map(|p| ProcessStats {
                cpu_percent: p.cpu_usage(),
                memory_bytes: p.memory(),
            })
    }

    /// Last-resort SIGTERM for children that resisted the handle's own
    /// terminate/kill escalation.
    #[cfg(unix)]
    pub fn send_sigterm(&self, pid: u32) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => true,
            Err(err) => {
                error!("failed to send SIGTERM to process {pid}: {err}");
                false
            }
        }
    }

    #[cfg(not(unix))]
    pub fn send_sigterm(&self, pid: u32) -> bool {
        let system = self.lock_system();
        match system.process(sysinfo::Pid::from_u32(pid)) {
            Some(process) => process.kill(),
            None => false,
        }
    }

    /// Scan the process table for daemon children: runtime-named executables
    /// whose first argument lives under `daemons_root`. Spawn-time PIDs are
    /// authoritative; this is a recovery aid.
    pub fn find_owned(&self, daemons_root: &Path) -> Vec<(u32, PathBuf)> {
        self.refresh_processes();
        let system = self.lock_system();
        let mut found = vec![];
        for (pid, process) in system.processes() {
            let name = process.name().to_string_lossy();
            if !RUNTIME_NAMES.contains(&name.as_ref()) {
                continue;
            }
            let cmd = process.cmd();
            if cmd.len() < 2 {
                continue;
            }
            let script = PathBuf::from(&cmd[1]);
            if script.starts_with(daemons_root) {
                found.push((pid.as_u32(), script));
            }
        }
        found
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessStats {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

/// Handle to a spawned child. Liveness comes straight from the OS via
/// `try_wait`, which also reaps the child once it exits.
#[derive(Debug)]
pub struct ProcHandle {
    pid: u32,
    child: Child,
}

impl ProcHandle {
    pub(crate) fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Graceful termination request.
    pub fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            if let Err(err) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                debug!("failed to send SIGTERM to pid {}: {err}", self.pid);
            }
        }
        #[cfg(not(unix))]
        {
            // No graceful signal on this platform.
            let _ = self.child.kill();
        }
    }

    /// Forceful termination; reaps the child.
    pub fn kill(&mut self) {
        if let Err(err) = self.child.kill() {
            debug!("failed to kill pid {}: {err}", self.pid);
        }
        let _ = self.child.wait();
    }

    pub fn memory_mb(&self) -> f64 {
        PROCS.refresh_pids(&[self.pid]);
        PROCS
            .get_stats(self.pid)
            .map(|s| s.memory_bytes as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    pub fn cpu_percent(&self) -> f32 {
        PROCS.refresh_pids(&[self.pid]);
        PROCS.get_stats(self.pid).map(|s| s.cpu_percent).unwrap_or(0.0)
    }

    /// Terminate, wait up to `grace`, then kill. Returns true once the child
    /// is gone.
    pub async fn shutdown(&mut self, grace: Duration) -> bool {
        if !self.is_running() {
            return true;
        }
        debug!("sending terminate to pid {}", self.pid);
        self.terminate();
        let deadline = time::Instant::now() + grace;
        while time::Instant::now() < deadline {
            time::sleep(Duration::from_millis(50)).await;
            if !self.is_running() {
                return true;
            }
        }
        warn!(
            "process {} did not respond to terminate after {:?}, killing",
            self.pid, grace
        );
        self.kill();
        time::sleep(Duration::from_millis(100)).await;
        !self.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CommandSpec, Executor};

    #[cfg(unix)]
    #[tokio::test]
    async fn test_handle_lifecycle() {
        let executor = Executor::new();
        let spec = CommandSpec::new("sh").arg("-c").arg("sleep 30");
        let mut handle = executor
            .spawn_detached(&spec, Path::new("/tmp"))
            .unwrap();
        assert!(handle.pid() > 0);
        assert!(handle.is_running());
        assert!(handle.shutdown(Duration::from_secs(3)).await);
        assert!(!handle.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_handle_observes_exit() {
        let executor = Executor::new();
        let spec = CommandSpec::new("sh").arg("-c").arg("exit 0");
        let mut handle = executor
            .spawn_detached(&spec, Path::new("/tmp"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_running());
        // shutting down an already-dead child is a no-op
        assert!(handle.shutdown(Duration::from_secs(1)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_stubborn_child() {
        let executor = Executor::new();
        // traps the polite signal, leaving only the forceful path
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30");
        let mut handle = executor
            .spawn_detached(&spec, Path::new("/tmp"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.shutdown(Duration::from_millis(300)).await);
        assert!(!handle.is_running());
    }
}
