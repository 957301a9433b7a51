//! The `daemons.yaml` configuration document and its resolution into
//! concrete daemon configs.

use crate::Result;
use crate::daemon::DaemonConfig;
use crate::env;
use crate::error::{ConfigError, DaemonLoadError};
use indexmap::IndexMap;
use miette::IntoDiagnostic;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_TARGET: &str = "main.py";
pub const DEFAULT_REQUIREMENTS: &str = "requirements.txt";
/// Sentinel meaning "no requirements for this daemon".
const IGNORE_REQUIREMENTS: &str = "-";

#[derive(Debug, Default, Deserialize)]
pub struct HellYaml {
    #[serde(rename = "daemons-path")]
    pub daemons_path: Option<PathBuf>,
    #[serde(rename = "default-args")]
    pub default_args: Option<ArgSpec>,
    #[serde(rename = "default-venv")]
    pub default_venv: Option<bool>,
    #[serde(rename = "default-auto-restart")]
    pub default_auto_restart: Option<bool>,
    #[serde(default)]
    pub daemons: IndexMap<String, DaemonYaml>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DaemonYaml {
    pub dir: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub arguments: Option<ArgSpec>,
    pub requirements: Option<String>,
    #[serde(rename = "auto-restart")]
    pub auto_restart: Option<bool>,
    pub virtualenv: Option<bool>,
    pub source: Option<String>,
}

/// Arguments accept either a scalar or a sequence of tokens. Scalars are
/// tokenized once, shell-style, at load time.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    Line(String),
    List(Vec<String>),
}

impl ArgSpec {
    pub fn tokens(&self) -> std::result::Result<Vec<String>, DaemonLoadError> {
        match self {
            ArgSpec::Line(line) => {
                shell_words::split(line).map_err(|e| DaemonLoadError::BadArguments {
                    details: e.to_string(),
                })
            }
            ArgSpec::List(list) => Ok(list.clone()),
        }
    }
}

impl HellYaml {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            }
            .into());
        }
        let raw = std::fs::read_to_string(path).into_diagnostic()?;
        if raw.trim().is_empty() {
            return Err(ConfigError::Empty {
                path: path.to_path_buf(),
            }
            .into());
        }
        let doc: HellYaml = serde_yaml::from_str(&raw).into_diagnostic()?;
        if doc.daemons.is_empty() {
            return Err(ConfigError::Empty {
                path: path.to_path_buf(),
            }
            .into());
        }
        Ok(doc)
    }

    /// Base directory where daemon working trees live.
    pub fn daemons_root(&self) -> PathBuf {
        match &self.daemons_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => env::CWD.join(path),
            None => env::CWD.join("daemons"),
        }
    }

    /// Resolve every declared daemon. Daemons that fail to resolve are
    /// skipped with a warning; the rest of the fleet proceeds.
    pub fn resolve(&self) -> Vec<DaemonConfig> {
        let root = self.daemons_root();
        let mut configs = vec![];
        for (name, daemon) in &self.daemons {
            match self.resolve_one(name, daemon, &root) {
                Ok(config) => configs.push(config),
                Err(err) => warn!("skipping daemon '{name}': {err}"),
            }
        }
        configs
    }

    fn resolve_one(
        &self,
        name: &str,
        daemon: &DaemonYaml,
        root: &Path,
    ) -> std::result::Result<DaemonConfig, DaemonLoadError> {
        let dir = daemon.dir.clone().unwrap_or_else(|| PathBuf::from(name));
        let project_folder = root.join(dir);
        if !project_folder.exists() {
            return Err(DaemonLoadError::DirNotFound {
                path: project_folder,
            });
        }

        let target = daemon
            .target
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET));
        let main_file = project_folder.join(target);
        if !main_file.exists() {
            return Err(DaemonLoadError::TargetNotFound { path: main_file });
        }

        let requirements_path = match daemon.requirements.as_deref() {
            None | Some(IGNORE_REQUIREMENTS) => None,
            Some("default") => Some(project_folder.join(DEFAULT_REQUIREMENTS)),
            Some(relative) => Some(project_folder.join(relative)),
        };
        if let Some(requirements) = &requirements_path {
            if !requirements.exists() {
                return Err(DaemonLoadError::RequirementsNotFound {
                    path: requirements.clone(),
                });
            }
        }

        let arguments = daemon
            .arguments
            .clone()
            .or_else(|| self.default_args.clone());
        let main_file_arguments = match arguments {
            Some(spec) => spec.tokens()?,
            None => vec![],
        };

        Ok(DaemonConfig {
            name: name.to_string(),
            project_folder,
            main_file,
            main_file_arguments,
            requirements_path,
            create_env: daemon.virtualenv.or(self.default_venv).unwrap_or(false),
            keep_running: daemon
                .auto_restart
                .or(self.default_auto_restart)
                .unwrap_or(false),
            source_url: daemon.source.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("daemons.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    fn scaffold_daemon(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.py"), "print('hi')\n").unwrap();
    }

    #[test]
    fn test_missing_config() {
        let err = HellYaml::read("/nonexistent/daemons.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_empty_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "");
        let err = HellYaml::read(&path).unwrap_err();
        assert!(err.to_string().contains("empty"));

        let path = write_config(tmp.path(), "daemons: {}\n");
        let err = HellYaml::read(&path).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_resolution_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("daemons");
        scaffold_daemon(&root, "echo");
        let path = write_config(
            tmp.path(),
            &format!("daemons-path: {}\ndaemons:\n  echo: {{}}\n", root.display()),
        );

        let doc = HellYaml::read(&path).unwrap();
        let configs = doc.resolve();
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.name, "echo");
        assert_eq!(config.project_folder, root.join("echo"));
        assert_eq!(config.main_file, root.join("echo").join("main.py"));
        assert!(config.main_file_arguments.is_empty());
        assert!(config.requirements_path.is_none());
        assert!(!config.create_env);
        assert!(!config.keep_running);
    }

    #[test]
    fn test_requirements_sentinels() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("daemons");
        scaffold_daemon(&root, "a");
        scaffold_daemon(&root, "b");
        fs::write(root.join("b").join("requirements.txt"), "requests\n").unwrap();
        let path = write_config(
            tmp.path(),
            &format!(
                "daemons-path: {}\n\
                 daemons:\n\
                 \x20 a:\n    requirements: \"-\"\n\
                 \x20 b:\n    requirements: default\n",
                root.display()
            ),
        );

        let configs = HellYaml::read(&path).unwrap().resolve();
        assert_eq!(configs.len(), 2);
        assert!(configs[0].requirements_path.is_none());
        assert_eq!(
            configs[1].requirements_path,
            Some(root.join("b").join("requirements.txt"))
        );
    }

    #[test]
    fn test_missing_paths_skip_daemon() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("daemons");
        scaffold_daemon(&root, "ok");
        fs::create_dir_all(root.join("no-target")).unwrap();
        let path = write_config(
            tmp.path(),
            &format!(
                "daemons-path: {}\n\
                 daemons:\n\
                 \x20 ok: {{}}\n\
                 \x20 ghost: {{}}\n\
                 \x20 no-target: {{}}\n\
                 \x20 no-reqs:\n    dir: ok\n    requirements: missing.txt\n",
                root.display()
            ),
        );

        let configs = HellYaml::read(&path).unwrap().resolve();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "ok");
    }

    #[test]
    fn test_argument_tokenization() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("daemons");
        scaffold_daemon(&root, "scalar");
        scaffold_daemon(&root, "list");
        let path = write_config(
            tmp.path(),
            &format!(
                "daemons-path: {}\n\
                 daemons:\n\
                 \x20 scalar:\n    arguments: \"--port 8080 --name 'my daemon'\"\n\
                 \x20 list:\n    arguments: [\"--a\", \"--b\"]\n",
                root.display()
            ),
        );

        let configs = HellYaml::read(&path).unwrap().resolve();
        assert_eq!(
            configs[0].main_file_arguments,
            ["--port", "8080", "--name", "my daemon"]
        );
        assert_eq!(configs[1].main_file_arguments, ["--a", "--b"]);
    }

    #[test]
    fn test_global_defaults_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("daemons");
        scaffold_daemon(&root, "echo");
        let path = write_config(
            tmp.path(),
            &format!(
                "daemons-path: {}\n\
                 default-auto-restart: true\n\
                 default-venv: true\n\
                 default-args: \"--quiet\"\n\
                 daemons:\n  echo: {{}}\n",
                root.display()
            ),
        );

        let configs = HellYaml::read(&path).unwrap().resolve();
        let config = &configs[0];
        assert!(config.keep_running);
        assert!(config.create_env);
        assert_eq!(config.main_file_arguments, ["--quiet"]);
    }

    #[test]
    fn test_config_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("daemons");
        scaffold_daemon(&root, "echo");
        let path = write_config(
            tmp.path(),
            &format!(
                "daemons-path: {}\n\
                 daemons:\n\
                 \x20 echo:\n    arguments: \"--x 1\"\n    auto-restart: true\n",
                root.display()
            ),
        );

        let configs = HellYaml::read(&path).unwrap().resolve();
        let serialized = serde_yaml::to_string(&configs[0]).unwrap();
        let reloaded: DaemonConfig = serde_yaml::from_str(&serialized).unwrap();
        assert_eq!(configs[0], reloaded);
    }
}
