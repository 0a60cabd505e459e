use std::{io::Read, path::Path};

use thiserror::Error;

mod cli;
mod workspace;

pub use cli::GitCli;
pub use workspace::Workspace;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("failed to initialize bare repository: {0}")]
    Init(String),
    #[error("fetch from upstream failed: {0}")]
    Fetch(String),
    #[error("failed to resolve ref: {0}")]
    Resolve(String),
    #[error("archive export failed: {0}")]
    Archive(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The delegate version-control tool, reduced to the four operations the
/// orchestration needs. The production implementation shells out to the git
/// binary; tests substitute a recording fake.
pub trait GitBackend: Send + Sync {
    /// Initialize an empty bare mirror at `git_dir`.
    fn init_bare(&self, git_dir: &Path) -> Result<(), GitError>;

    /// Pull `branch` from `repo` into the mirror under the same local ref
    /// name, so later resolve/archive calls can address it directly.
    fn fetch_branch(&self, git_dir: &Path, repo: &str, branch: &str) -> Result<(), GitError>;

    /// Resolve a ref to its commit id, trimmed of surrounding whitespace.
    fn resolve_ref(&self, git_dir: &Path, refname: &str) -> Result<String, GitError>;

    /// Start a tar export of `commit:tree` and hand back its output stream.
    /// The stream is read incrementally while the export runs; `finish` must
    /// be called after EOF to observe the exit status.
    fn export_tar(
        &self,
        git_dir: &Path,
        commit: &str,
        tree: &str,
    ) -> Result<Box<dyn TarSource>, GitError>;
}

/// A live tar stream produced by the delegate tool.
///
/// A non-zero exit reported by `finish` is the normal signal that the
/// requested commit is not present in the mirror yet.
pub trait TarSource: Read + Send {
    fn finish(&mut self) -> Result<(), GitError>;
}
