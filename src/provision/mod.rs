//! The prepare-environment pipeline: source acquisition and dependency
//! provisioning, run before a daemon's first launch.

mod pyenv;
mod source;

pub use pyenv::{ENV_DIR, PyEnv};
pub use source::{is_remote, sync_source};
