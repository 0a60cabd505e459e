use std::path::{Path, PathBuf};

use log::info;
use tokio::sync::OwnedMutexGuard;

use super::{GitBackend, GitError};
use crate::flock::FileLock;

/// A bare local mirror of one repository, ready for fetch/resolve/archive
/// operations. Holding a `Workspace` holds both the in-process per-key lock
/// and the cross-process file lock, so at most one orchestration touches a
/// given mirror at a time.
pub struct Workspace {
    git_dir: PathBuf,
    _key_guard: OwnedMutexGuard<()>,
    _file_lock: FileLock,
}

impl Workspace {
    pub(crate) fn new(git_dir: PathBuf, key_guard: OwnedMutexGuard<()>, file_lock: FileLock) -> Self {
        Workspace {
            git_dir,
            _key_guard: key_guard,
            _file_lock: file_lock,
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Pull `branch` from the upstream repository into this mirror.
    pub fn fetch_upstream(
        &self,
        backend: &dyn GitBackend,
        repo: &str,
        branch: &str,
    ) -> Result<(), GitError> {
        info!("Fetching {branch} from {repo}");
        backend.fetch_branch(&self.git_dir, repo, branch)
    }

    /// Fetch `branch` and resolve it to its current commit id.
    ///
    /// This always hits the network; the result is only good for the current
    /// request and must not be treated as cache-validity evidence.
    pub fn resolve_head(
        &self,
        backend: &dyn GitBackend,
        repo: &str,
        branch: &str,
    ) -> Result<String, GitError> {
        self.fetch_upstream(backend, repo, branch)?;
        backend.resolve_ref(&self.git_dir, branch)
    }
}
