//! Materialize a daemon's working tree from a remote repository or a local
//! archive, converging an existing checkout to a clean HEAD.

use crate::cmd::{CommandSpec, EXECUTOR};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(120);

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://") || source.starts_with("git@")
}

/// Materialize `parent_folder/target_name` from `source`. Returns true on
/// success; all failure modes are logged and reported as false so the caller
/// can treat them uniformly as a provisioning failure.
pub async fn sync_source(
    target_name: &str,
    source: &str,
    parent_folder: &Path,
    clean_untracked: bool,
) -> bool {
    if is_remote(source) {
        sync_repository(target_name, source, parent_folder, clean_untracked).await
    } else {
        extract_archive(Path::new(source), parent_folder)
    }
}

async fn git(dir: &Path, args: &[&str]) -> Option<(i32, String)> {
    let spec = CommandSpec::new("git")
        .arg("-C")
        .arg(dir.display().to_string())
        .args(args.iter().copied());
    match EXECUTOR.execute_blocking(&spec, false, GIT_TIMEOUT).await {
        Ok(result) => Some(result),
        Err(err) => {
            error!("git {} failed: {err}", args.join(" "));
            None
        }
    }
}

async fn sync_repository(
    target_name: &str,
    url: &str,
    parent_folder: &Path,
    clean_untracked: bool,
) -> bool {
    let local = parent_folder.join(target_name);
    if !local.join(".git").exists() {
        info!("cloning '{url}' into {}", local.display());
        return match git(parent_folder, &["clone", url, target_name]).await {
            Some((0, _)) => {
                info!("repository '{target_name}' cloned");
                true
            }
            Some((code, output)) => {
                error!("clone of '{url}' exited with code {code}: {output}");
                false
            }
            None => false,
        };
    }

    debug!("repository '{target_name}' already cloned, checking for updates");
    match git(&local, &["fetch", "origin"]).await {
        Some((0, _)) => {}
        _ => {
            error!("fetch failed for repository '{target_name}'");
            return false;
        }
    }

    if clean_untracked {
        info!("cleaning untracked files in '{target_name}'");
        if !matches!(git(&local, &["clean", "-fd"]).await, Some((0, _))) {
            return false;
        }
    } else if let Some((0, ignored)) = git(
        &local,
        &["ls-files", "--others", "--ignored", "--exclude-standard"],
    )
    .await
    {
        // reported, never deleted
        if !ignored.trim().is_empty() {
            warn!(
                "repository '{target_name}' carries ignored untracked files: {}",
                ignored.lines().collect::<Vec<_>>().join(", ")
            );
        }
    }

    match git(&local, &["status", "--porcelain", "--untracked-files=no"]).await {
        Some((0, status)) if !status.trim().is_empty() => {
            info!("local tree of '{target_name}' has changes, resetting to HEAD");
            if !matches!(git(&local, &["reset", "--hard", "HEAD"]).await, Some((0, _))) {
                return false;
            }
        }
        Some((0, _)) => {}
        _ => {
            error!("status probe failed for repository '{target_name}'");
            return false;
        }
    }

    match git(&local, &["pull"]).await {
        Some((0, _)) => {
            debug!("repository '{target_name}' is at the latest version");
            true
        }
        _ => {
            error!("pull failed for repository '{target_name}'");
            false
        }
    }
}

fn extract_archive(archive: &Path, parent_folder: &Path) -> bool {
    if !archive.exists() {
        error!("archive '{}' does not exist", archive.display());
        return false;
    }
    let Some(stem) = archive.file_stem() else {
        error!("archive '{}' has no stem", archive.display());
        return false;
    };
    let target = parent_folder.join(stem);
    if target.exists() {
        debug!("archive target '{}' already present", target.display());
        return true;
    }

    let file = match File::open(archive) {
        Ok(file) => file,
        Err(err) => {
            error!("cannot open archive '{}': {err}", archive.display());
            return false;
        }
    };
    let mut zip = match zip::ZipArchive::new(file) {
        Ok(zip) => zip,
        Err(err) => {
            error!("bad archive '{}': {err}", archive.display());
            return false;
        }
    };
    if let Err(err) = std::fs::create_dir_all(&target) {
        error!("cannot create '{}': {err}", target.display());
        return false;
    }
    match zip.extract(parent_folder) {
        Ok(()) => {
            info!("archive '{}' extracted", archive.display());
            true
        }
        Err(err) => {
            error!("failed to extract archive '{}': {err}", archive.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/repo.git"));
        assert!(is_remote("http://example.com/repo.git"));
        assert!(is_remote("git@github.com:user/repo.git"));
        assert!(!is_remote("/var/tmp/bundle.zip"));
        assert!(!is_remote("bundle.zip"));
    }

    #[tokio::test]
    async fn test_missing_archive() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!sync_source("ghost", "/nonexistent/bundle.zip", tmp.path(), false).await);
    }

    #[tokio::test]
    async fn test_bad_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        std::fs::write(&archive, b"this is not a zip").unwrap();
        assert!(!sync_source("broken", archive.to_str().unwrap(), tmp.path(), false).await);
    }

    #[tokio::test]
    async fn test_extract_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bundle.zip");
        {
            let file = File::create(&archive).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            writer
                .start_file("bundle/main.py", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"print('hi')\n").unwrap();
            writer.finish().unwrap();
        }

        let parent = tmp.path().join("daemons");
        std::fs::create_dir_all(&parent).unwrap();
        assert!(sync_source("bundle", archive.to_str().unwrap(), &parent, false).await);
        assert!(parent.join("bundle").join("main.py").exists());

        // converges without re-extracting
        assert!(sync_source("bundle", archive.to_str().unwrap(), &parent, false).await);
    }
}
