//! Argv-shaped command values and the process-wide executor.

use crate::Result;
use crate::error::ExecError;
use crate::procs::ProcHandle;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::time;

/// How many executed command strings are kept for observability.
const HISTORY_LIMIT: usize = 100;

/// An executable plus its ordered argv tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    tokens: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            tokens: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.tokens.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(args.into_iter().map(Into::into));
        self
    }

    /// Concatenate two specs into a new one.
    pub fn join(&self, other: &CommandSpec) -> CommandSpec {
        let mut tokens = self.tokens.clone();
        tokens.extend(other.tokens.iter().cloned());
        CommandSpec { tokens }
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn argv(&self) -> &[String] {
        &self.tokens[1..]
    }

    /// True iff the program resolves on PATH or exists as an absolute path.
    pub fn verify(&self) -> bool {
        let program = Path::new(self.program());
        if program.is_absolute() {
            return program.exists();
        }
        resolve_on_path(self.program()).is_some()
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", shell_words::join(&self.tokens))
    }
}

pub(crate) fn resolve_on_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&paths) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let candidate = dir.join(format!("{program}.exe"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

pub struct Executor {
    history: Mutex<VecDeque<String>>,
}

pub static EXECUTOR: Lazy<Executor> = Lazy::new(Executor::new);

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
        }
    }

    fn record(&self, spec: &CommandSpec) {
        let mut history = match self.history.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        if history.len() >= HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(spec.to_string());
    }

    pub fn history(&self) -> Vec<String> {
        match self.history.lock() {
            Ok(h) => h.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Run the command to completion, capturing interleaved stdout/stderr
    /// line by line. A zero `timeout` means wait forever; on expiry the child
    /// is killed and the call fails.
    pub async fn execute_blocking(
        &self,
        spec: &CommandSpec,
        show_output: bool,
        timeout: Duration,
    ) -> Result<(i32, String)> {
        self.record(spec);
        if !spec.verify() {
            return Err(ExecError::Unresolvable {
                program: spec.program().to_string(),
            }
            .into());
        }
        debug!("running command: {spec}");

        let mut child = tokio::process::Command::new(spec.program())
            .args(spec.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::SpawnFailed {
                command: spec.to_string(),
                details: e.to_string(),
            })?;

        let (Some(out), Some(err)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ExecError::SpawnFailed {
                command: spec.to_string(),
                details: "failed to capture output".to_string(),
            }
            .into());
        };
        let mut stdout = BufReader::new(out).lines();
        let mut stderr = BufReader::new(err).lines();
        let mut captured: Vec<String> = vec![];

        let drain = async {
            loop {
                select! {
                    Ok(Some(line)) = stdout.next_line() => {
                        if show_output {
                            info!("{line}");
                        }
                        captured.push(line);
                    }
                    Ok(Some(line)) = stderr.next_line() => {
                        if show_output {
                            info!("{line}");
                        }
                        captured.push(line);
                    }
                    else => break,
                }
            }
            child.wait().await
        };

        let status = if timeout.is_zero() {
            drain.await
        } else {
            match time::timeout(timeout, drain).await {
                Ok(status) => status,
                Err(_) => {
                    let _ = child.kill().await;
                    error!("command '{spec}' timed out");
                    return Err(ExecError::Timeout {
                        command: spec.to_string(),
                        timeout_secs: timeout.as_secs(),
                    }
                    .into());
                }
            }
        };
        let status = status.map_err(|e| ExecError::SpawnFailed {
            command: spec.to_string(),
            details: e.to_string(),
        })?;

        let code = status.code().unwrap_or(-1);
        let output = captured.join("\n");
        if code != 0 {
            debug!("command '{spec}' exited with code {code}");
        }
        Ok((code, output))
    }

    /// Fork a detached child: null stdio, its own session on unix, nothing
    /// inherited from the parent beyond the environment.
    pub fn spawn_detached(&self, spec: &CommandSpec, dir: &Path) -> Result<ProcHandle> {
        self.record(spec);
        if !spec.verify() {
            return Err(ExecError::Unresolvable {
                program: spec.program().to_string(),
            }
            .into());
        }
        let mut cmd = std::process::Command::new(spec.program());
        cmd.args(spec.argv())
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own session so the child does not die with the supervisor's terminal.
        #[cfg(unix)]
        unsafe {
            use std::os::unix::process::CommandExt;
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|e| ExecError::SpawnFailed {
            command: spec.to_string(),
            details: e.to_string(),
        })?;
        debug!("spawned '{spec}' with pid {}", child.id());
        Ok(ProcHandle::new(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_building() {
        let spec = CommandSpec::new("git")
            .arg("-C")
            .arg("/tmp")
            .args(["fetch", "origin"]);
        assert_eq!(spec.program(), "git");
        assert_eq!(spec.argv(), ["-C", "/tmp", "fetch", "origin"]);
        assert_eq!(spec.to_string(), "git -C /tmp fetch origin");
    }

    #[test]
    fn test_spec_join() {
        let base = CommandSpec::new("python3").arg("main.py");
        let extra = CommandSpec::new("--verbose").arg("--port=8080");
        let joined = base.join(&extra);
        assert_eq!(joined.program(), "python3");
        assert_eq!(joined.argv(), ["main.py", "--verbose", "--port=8080"]);
        // join does not mutate its operands
        assert_eq!(base.argv(), ["main.py"]);
    }

    #[test]
    fn test_verify_unresolvable() {
        assert!(!CommandSpec::new("definitely-not-a-real-binary-9341").verify());
        assert!(!CommandSpec::new("/nonexistent/path/to/binary").verify());
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_resolves_on_path() {
        assert!(CommandSpec::new("sh").verify());
        assert!(CommandSpec::new("/bin/sh").verify());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_blocking_captures_output() {
        let executor = Executor::new();
        let spec = CommandSpec::new("sh").arg("-c").arg("echo one; echo two");
        let (code, output) = executor
            .execute_blocking(&spec, false, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(output, "one\ntwo");
        assert_eq!(executor.history().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_blocking_nonzero_exit() {
        let executor = Executor::new();
        let spec = CommandSpec::new("sh").arg("-c").arg("exit 3");
        let (code, _) = executor
            .execute_blocking(&spec, false, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_blocking_timeout_kills() {
        let executor = Executor::new();
        let spec = CommandSpec::new("sh").arg("-c").arg("sleep 30");
        let err = executor
            .execute_blocking(&spec, false, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_execute_blocking_unresolvable() {
        let executor = Executor::new();
        let spec = CommandSpec::new("definitely-not-a-real-binary-9341");
        let err = executor
            .execute_blocking(&spec, false, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not be resolved"));
    }

    #[test]
    fn test_history_is_bounded() {
        let executor = Executor::new();
        for i in 0..(HISTORY_LIMIT + 20) {
            executor.record(&CommandSpec::new(format!("cmd-{i}")));
        }
        let history = executor.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0], "cmd-20");
    }
}
