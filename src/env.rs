use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;
use std::time::Duration;

pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_default());
pub static HOME_DIR: Lazy<PathBuf> = Lazy::new(|| dirs::home_dir().unwrap_or_default());

pub static HELL_STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("HELL_STATE_DIR").unwrap_or(
        dirs::state_dir()
            .unwrap_or(HOME_DIR.join(".local").join("state"))
            .join("hell"),
    )
});
pub static HELL_CONFIG_PATH: Lazy<PathBuf> =
    Lazy::new(|| var_path("HELL_CONFIG").unwrap_or(CWD.join("daemons.yaml")));
pub static HELL_DB_PATH: Lazy<PathBuf> =
    Lazy::new(|| var_path("HELL_DB").unwrap_or(HELL_STATE_DIR.join("access.db")));
pub static HELL_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("HELL_LOG").unwrap_or(log::LevelFilter::Info));
pub static HELL_LOG_FILE: Lazy<PathBuf> =
    Lazy::new(|| var_path("HELL_LOG_FILE").unwrap_or(HELL_STATE_DIR.join("hell.log")));
pub static HELL_WATCHER_INTERVAL: Lazy<Duration> =
    Lazy::new(|| Duration::from_millis(var_u64("HELL_WATCHER_INTERVAL_MS").unwrap_or(1000)));

/// Interpreter used to launch daemons that have no private environment.
pub fn python_command() -> String {
    var("HELL_PYTHON").unwrap_or_else(|_| DEFAULT_PYTHON.to_string())
}

#[cfg(windows)]
const DEFAULT_PYTHON: &str = "python";
#[cfg(not(windows))]
const DEFAULT_PYTHON: &str = "python3";

fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}

fn var_u64(name: &str) -> Option<u64> {
    var(name).ok().and_then(|val| val.parse().ok())
}
