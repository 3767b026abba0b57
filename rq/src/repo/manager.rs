//! Repository acquisition: local checkout validation and shallow clones

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{RepoError, RepoSource, RepoTargets};

/// A repository checkout the pipeline can read from.
///
/// Clones own a temporary directory that lives until [`AcquiredRepo::cleanup`];
/// local checkouts are borrowed and never deleted.
pub struct AcquiredRepo {
    root: PathBuf,
    temp: Option<TempDir>,
}

impl AcquiredRepo {
    /// Use an existing local directory as the repository root
    pub fn local(path: &Path) -> Result<Self, RepoError> {
        if !path.is_dir() {
            return Err(RepoError::NotADirectory(path.to_path_buf()));
        }
        debug!(root = %path.display(), "AcquiredRepo::local: using existing directory");
        Ok(Self {
            root: path.to_path_buf(),
            temp: None,
        })
    }

    /// Shallow-clone a repository into a fresh temporary directory.
    ///
    /// A failed clone removes the partial directory before returning.
    pub async fn clone_from(repo_url: &str, branch: Option<&str>) -> Result<Self, RepoError> {
        let temp = tempfile::Builder::new().prefix("repoquery-").tempdir()?;
        let root = temp.path().to_path_buf();
        info!(%repo_url, ?branch, dest = %root.display(), "cloning repository");

        let mut args: Vec<&str> = vec!["clone", "--depth", "1"];
        if let Some(branch) = branch {
            args.extend(["-b", branch]);
        }

        let output = Command::new("git")
            .args(&args)
            .arg(repo_url)
            .arg(&root)
            .output()
            .await
            .map_err(|e| RepoError::CloneFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("clone_from: git clone failed");
            // Dropping `temp` removes the partial clone
            return Err(RepoError::CloneFailed(stderr.trim().to_string()));
        }

        debug!("clone_from: git clone succeeded");
        Ok(Self { root, temp: Some(temp) })
    }

    /// Acquire the repository named by parsed targets
    pub async fn acquire(targets: &RepoTargets) -> Result<Self, RepoError> {
        match &targets.source {
            RepoSource::Remote { repo_url } => Self::clone_from(repo_url, targets.branch.as_deref()).await,
            RepoSource::Local { root } => Self::local(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of one target directory inside the checkout
    pub fn dir_path(&self, dir: &str) -> PathBuf {
        if dir == "." { self.root.clone() } else { self.root.join(dir) }
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Remove the clone's temporary directory; call once, after every
    /// reader has finished. Local checkouts are left untouched.
    pub fn cleanup(self) {
        if let Some(temp) = self.temp {
            let path = temp.path().to_path_buf();
            match temp.close() {
                Ok(()) => info!(path = %path.display(), "removed cloned repository"),
                Err(e) => warn!(error = %e, path = %path.display(), "failed to remove cloned repository"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    async fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git").args(args).current_dir(dir).output().await.unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    async fn init_repo(dir: &Path) {
        git(dir, &["init", "-b", "main"]).await;
        git(dir, &["config", "user.email", "test@example.com"]).await;
        git(dir, &["config", "user.name", "Test"]).await;
        std::fs::write(dir.join("main.py"), "x = 1\n").unwrap();
        git(dir, &["add", "."]).await;
        git(dir, &["commit", "-m", "init"]).await;
    }

    #[test]
    fn test_local_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = AcquiredRepo::local(dir.path()).unwrap();

        assert_eq!(repo.root(), dir.path());
        assert!(!repo.is_temporary());

        repo.cleanup();
        assert!(dir.path().exists(), "local directories must survive cleanup");
    }

    #[test]
    fn test_local_missing_path() {
        let result = AcquiredRepo::local(Path::new("/nonexistent/repoquery-test"));
        assert!(matches!(result, Err(RepoError::NotADirectory(_))));
    }

    #[test]
    fn test_dir_path_handles_root_marker() {
        let dir = tempfile::tempdir().unwrap();
        let repo = AcquiredRepo::local(dir.path()).unwrap();

        assert_eq!(repo.dir_path("."), dir.path());
        assert_eq!(repo.dir_path("src/module"), dir.path().join("src/module"));
    }

    #[tokio::test]
    #[serial]
    async fn test_clone_and_cleanup() {
        let origin = tempfile::tempdir().unwrap();
        init_repo(origin.path()).await;

        let repo = AcquiredRepo::clone_from(origin.path().to_str().unwrap(), Some("main"))
            .await
            .unwrap();

        assert!(repo.is_temporary());
        assert!(repo.root().join("main.py").exists());
        let root = repo.root().to_path_buf();

        repo.cleanup();
        assert!(!root.exists(), "cloned directory must be removed");
    }

    #[tokio::test]
    #[serial]
    async fn test_clone_failure_removes_partial_directory() {
        let before: Vec<_> = leftover_clone_dirs();

        let result = AcquiredRepo::clone_from("/nonexistent/repoquery-origin", None).await;
        assert!(matches!(result, Err(RepoError::CloneFailed(_))));

        assert_eq!(leftover_clone_dirs().len(), before.len());
    }

    fn leftover_clone_dirs() -> Vec<PathBuf> {
        std::fs::read_dir(std::env::temp_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("repoquery-"))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
