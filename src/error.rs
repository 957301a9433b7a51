//! Typed domain errors with diagnostic codes via miette.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Global start aborts on these.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("configuration file not found at {}", path.display())]
    #[diagnostic(
        code(hell::config::missing),
        help("create a daemons.yaml or point HELL_CONFIG at one")
    )]
    Missing { path: PathBuf },

    #[error("configuration file {} is empty", path.display())]
    #[diagnostic(
        code(hell::config::empty),
        help("declare at least one daemon under the `daemons` key")
    )]
    Empty { path: PathBuf },
}

/// Per-daemon load problems. The daemon is skipped with a warning and the
/// supervisor continues with the rest of the fleet.
#[derive(Debug, Error, Diagnostic)]
pub enum DaemonLoadError {
    #[error("daemon directory {} not found", path.display())]
    #[diagnostic(code(hell::config::daemon_dir_not_found))]
    DirNotFound { path: PathBuf },

    #[error("target file {} not found", path.display())]
    #[diagnostic(code(hell::config::target_not_found))]
    TargetNotFound { path: PathBuf },

    #[error("requirements file {} not found", path.display())]
    #[diagnostic(code(hell::config::requirements_not_found))]
    RequirementsNotFound { path: PathBuf },

    #[error("cannot tokenize arguments: {details}")]
    #[diagnostic(code(hell::config::bad_arguments))]
    BadArguments { details: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum DaemonError {
    #[error("daemon '{name}' is already running with pid {pid}")]
    #[diagnostic(code(hell::daemon::already_running))]
    AlreadyRunning { name: String, pid: u32 },

    #[error("daemon '{name}' is not running")]
    #[diagnostic(code(hell::daemon::not_running))]
    NotRunning { name: String },

    #[error("daemon '{name}' not found")]
    #[diagnostic(code(hell::daemon::not_found))]
    NotFound { name: String },

    #[error("daemon '{name}' [pid {pid}] survived terminate and kill")]
    #[diagnostic(code(hell::daemon::stop_failed))]
    StopFailed { name: String, pid: u32 },

    #[error("restart budget exhausted for daemon '{name}' after {failed} failed starts")]
    #[diagnostic(
        code(hell::daemon::restart_budget_exhausted),
        help("a manual start re-arms auto-restart")
    )]
    RestartBudgetExhausted { name: String, failed: u32 },
}

/// Prepare-environment pipeline failures. Counters advance, the same start()
/// call never retries.
#[derive(Debug, Error, Diagnostic)]
pub enum ProvisionError {
    #[error("failed to create environment for daemon '{name}'")]
    #[diagnostic(code(hell::provision::env_creation_failed))]
    EnvCreationFailed { name: String },

    #[error("failed to install requirements for daemon '{name}'")]
    #[diagnostic(code(hell::provision::requirements_install_failed))]
    RequirementsInstallFailed { name: String },

    #[error("failed to sync source for daemon '{name}' from '{source_url}'")]
    #[diagnostic(code(hell::provision::source_sync_failed))]
    SourceSyncFailed { name: String, source_url: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum ExecError {
    #[error("executable '{program}' could not be resolved")]
    #[diagnostic(
        code(hell::exec::spawn_failed),
        help("make sure the program is on PATH or use an absolute path")
    )]
    Unresolvable { program: String },

    #[error("failed to spawn '{command}': {details}")]
    #[diagnostic(code(hell::exec::spawn_failed))]
    SpawnFailed { command: String, details: String },

    #[error("command '{command}' timed out after {timeout_secs}s")]
    #[diagnostic(code(hell::exec::timeout))]
    Timeout { command: String, timeout_secs: u64 },
}

#[derive(Debug, Error, Diagnostic)]
pub enum AccessError {
    #[error("Invalid API key")]
    #[diagnostic(code(hell::access::invalid_token))]
    InvalidToken,

    #[error("Access denied: This endpoint is accessible only from the local network")]
    #[diagnostic(code(hell::access::not_local_network))]
    NotLocalNetwork,

    #[error("Rate limit exceeded, try again later")]
    #[diagnostic(code(hell::access::rate_limited))]
    RateLimited,

    #[error("Invalid invitation code")]
    #[diagnostic(code(hell::access::invalid_invitation))]
    InvalidInvitation,

    #[error("Invitation code already used")]
    #[diagnostic(code(hell::access::invitation_used))]
    InvitationUsed,

    #[error("Invitation expired at {}", expired_at.format("%d/%m/%Y %H:%M:%S"))]
    #[diagnostic(code(hell::access::invitation_expired))]
    InvitationExpired { expired_at: DateTime<Utc> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_error_display() {
        let err = DaemonError::AlreadyRunning {
            name: "echo".to_string(),
            pid: 1234,
        };
        assert_eq!(
            err.to_string(),
            "daemon 'echo' is already running with pid 1234"
        );

        let err = DaemonError::NotRunning {
            name: "echo".to_string(),
        };
        assert_eq!(err.to_string(), "daemon 'echo' is not running");
    }

    #[test]
    fn test_load_error_display() {
        let err = DaemonLoadError::DirNotFound {
            path: PathBuf::from("/tmp/daemons/missing"),
        };
        assert!(err.to_string().contains("daemon directory"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_access_error_display() {
        assert_eq!(
            AccessError::InvitationUsed.to_string(),
            "Invitation code already used"
        );
        let err = AccessError::InvitationExpired {
            expired_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        assert!(err.to_string().starts_with("Invitation expired at"));
    }
}
