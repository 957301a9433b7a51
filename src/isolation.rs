//! Launch strategy for daemon children: a sandbox where the platform offers
//! one, a plain detached process everywhere else. Selected once at startup
//! by capability detection.

use crate::Result;
use crate::cmd::{CommandSpec, EXECUTOR};
use crate::procs::ProcHandle;
use miette::IntoDiagnostic;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

/// Fixed mount point the sandbox maps the project folder onto.
const SANDBOX_FOLDER: &str = r"C:\sandbox";
const SANDBOX_CONFIG_NAME: &str = "sandbox.wsb";

const WSB_TEMPLATE: &str = r#"<Configuration>
  <MappedFolders>
    <MappedFolder>
      <HostFolder>{{HOST_FOLDER}}</HostFolder>
      <SandboxFolder>{{SANDBOX_FOLDER}}</SandboxFolder>
      <ReadOnly>false</ReadOnly>
    </MappedFolder>
  </MappedFolders>
  <LogonCommand>
    <Command>{{COMMAND}}</Command>
  </LogonCommand>
</Configuration>
"#;

#[derive(Debug, Clone)]
pub enum Isolation {
    /// Windows Sandbox launched through the given binary.
    Sandbox { exe: PathBuf },
    /// Plain detached child.
    Plain,
}

pub static ISOLATION: Lazy<Isolation> = Lazy::new(Isolation::detect);

impl Isolation {
    pub fn detect() -> Self {
        match sandbox_exe() {
            Some(exe) => {
                info!("sandbox isolation available at {}", exe.display());
                Isolation::Sandbox { exe }
            }
            None => {
                #[cfg(windows)]
                warn!("WindowsSandbox not found, process isolation will be disabled");
                Isolation::Plain
            }
        }
    }

    /// Launch `spec` for the project at `project_folder`, returning a process
    /// handle regardless of the strategy taken.
    pub fn spawn(&self, spec: &CommandSpec, project_folder: &Path) -> Result<ProcHandle> {
        match self {
            Isolation::Sandbox { exe } => {
                if !exe.exists() {
                    warn!("sandbox binary disappeared, falling back to plain spawn");
                    return EXECUTOR.spawn_detached(spec, project_folder);
                }
                let rendered = render_sandbox_config(spec, project_folder);
                let config_path = project_folder.join(SANDBOX_CONFIG_NAME);
                std::fs::write(&config_path, rendered).into_diagnostic()?;
                let launch =
                    CommandSpec::new(exe.display().to_string()).arg(config_path.display().to_string());
                EXECUTOR.spawn_detached(&launch, project_folder)
            }
            Isolation::Plain => EXECUTOR.spawn_detached(spec, project_folder),
        }
    }
}

fn render_sandbox_config(spec: &CommandSpec, project_folder: &Path) -> String {
    WSB_TEMPLATE
        .replace("{{HOST_FOLDER}}", &project_folder.display().to_string())
        .replace("{{SANDBOX_FOLDER}}", SANDBOX_FOLDER)
        .replace("{{COMMAND}}", &spec.to_string())
}

#[cfg(windows)]
fn sandbox_exe() -> Option<PathBuf> {
    let system = PathBuf::from(r"C:\Windows\system32\WindowsSandbox.exe");
    if system.exists() {
        return Some(system);
    }
    crate::cmd::resolve_on_path("WindowsSandbox.exe")
}

#[cfg(not(windows))]
fn sandbox_exe() -> Option<PathBuf> {
    None
}
