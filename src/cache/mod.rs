mod key;

use std::{
    fs,
    path::PathBuf,
    sync::Arc,
};

use dashmap::DashMap;
use log::{info, trace};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    flock::FileLock,
    git::{GitBackend, GitError, Workspace},
};

pub use key::CacheKey;

/// On-disk cache of bare repository mirrors, one per [`CacheKey`].
///
/// The cache never evicts: mirrors are created on first use and mutated by
/// later fetches. Concurrent requests for the same key are serialized through
/// an on-demand per-key mutex plus an advisory file lock next to the mirror.
pub struct ArchiveCache {
    location: PathBuf,
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired: {0}")]
    Lock(#[from] crate::flock::Error),
    #[error("Failed to initialize mirror: {0}")]
    Init(#[source] GitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveCache {
    pub fn new(location: PathBuf) -> Result<ArchiveCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.display().to_string(),
                });
            }
        } else {
            fs::create_dir_all(&location)?;
        }

        Ok(ArchiveCache {
            location,
            locks: DashMap::new(),
        })
    }

    pub fn location(&self) -> &PathBuf {
        &self.location
    }

    /// Ensure a mirror exists for `repo` and return it with its locks held.
    ///
    /// An existing directory is assumed to be a valid mirror and is not
    /// re-validated; a failed initialization may leave a partially created
    /// directory behind.
    pub fn open_workspace(
        &self,
        backend: &dyn GitBackend,
        repo: &str,
    ) -> Result<Workspace, CacheError> {
        let key = CacheKey::for_repository(repo);
        trace!("Repository {repo} maps to workspace {key}");

        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let key_guard = mutex.blocking_lock_owned();
        let file_lock = FileLock::new(&self.location.join(format!("{key}.lock")))?;

        let git_dir = self.location.join(key.as_str());
        match fs::metadata(&git_dir) {
            Ok(_) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating new mirror at {}", git_dir.display());
                fs::create_dir_all(&git_dir)?;
                backend.init_bare(&git_dir).map_err(CacheError::Init)?;
            }
            Err(error) => return Err(error.into()),
        }

        Ok(Workspace::new(git_dir, key_guard, file_lock))
    }

    /// Delete the whole cache root. Mirrors are rebuilt on demand.
    pub fn clear(&self) -> anyhow::Result<()> {
        if self.location.exists() {
            info!("Clearing archive cache {}.", self.location.display());
            fs::remove_dir_all(&self.location)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::git::TarSource;

    struct CountingBackend {
        init_calls: std::sync::atomic::AtomicUsize,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                init_calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn init_count(&self) -> usize {
            self.init_calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl GitBackend for CountingBackend {
        fn init_bare(&self, _git_dir: &Path) -> Result<(), GitError> {
            self.init_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn fetch_branch(&self, _: &Path, _: &str, _: &str) -> Result<(), GitError> {
            unimplemented!()
        }

        fn resolve_ref(&self, _: &Path, _: &str) -> Result<String, GitError> {
            unimplemented!()
        }

        fn export_tar(&self, _: &Path, _: &str, _: &str) -> Result<Box<dyn TarSource>, GitError> {
            unimplemented!()
        }
    }

    #[test]
    fn first_use_creates_and_initializes_the_mirror() {
        let root = tempfile::tempdir().unwrap();
        let cache = ArchiveCache::new(root.path().join("cache")).unwrap();
        let backend = CountingBackend::new();

        let workspace = cache
            .open_workspace(&backend, "https://example.test/repo.git")
            .unwrap();
        assert!(workspace.git_dir().is_dir());
        assert_eq!(backend.init_count(), 1);
    }

    #[test]
    fn reuse_skips_initialization() {
        let root = tempfile::tempdir().unwrap();
        let cache = ArchiveCache::new(root.path().join("cache")).unwrap();
        let backend = CountingBackend::new();

        let first = cache
            .open_workspace(&backend, "https://example.test/repo.git")
            .unwrap();
        let git_dir = first.git_dir().to_path_buf();
        drop(first);

        let second = cache
            .open_workspace(&backend, "https://example.test/repo.git")
            .unwrap();
        assert_eq!(second.git_dir(), git_dir.as_path());
        assert_eq!(backend.init_count(), 1);
    }

    #[test]
    fn distinct_repositories_get_distinct_mirrors() {
        let root = tempfile::tempdir().unwrap();
        let cache = ArchiveCache::new(root.path().join("cache")).unwrap();
        let backend = CountingBackend::new();

        let a = cache.open_workspace(&backend, "https://example.test/a.git").unwrap();
        let b = cache.open_workspace(&backend, "https://example.test/b.git").unwrap();
        assert_ne!(a.git_dir(), b.git_dir());
    }

    #[test]
    fn bad_location_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("occupied");
        std::fs::write(&file, b"not a directory").unwrap();

        let result = ArchiveCache::new(file);
        assert!(matches!(result, Err(CacheError::BadLocation { .. })));
    }
}
