use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use log::{debug, info};
use thiserror::Error;

use crate::{
    archive::{self, ArchiveError, Format},
    cache::{ArchiveCache, CacheError},
    git::{GitBackend, GitError},
};

/// One archive request. `commit` absent means "the current tip of `branch`";
/// an empty `tree` selects the whole tree.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub repo: String,
    pub branch: String,
    pub commit: Option<String>,
    pub tree: String,
    pub format: Format,
}

/// Destination for the archive bytes: either a caller-supplied stream, or a
/// file named `<commit>.<format>` created under a directory. Exactly one sink
/// is active per request.
pub enum Output<'a> {
    Stream(&'a mut dyn Write),
    Directory(&'a Path),
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// A request field is missing or invalid; nothing was touched.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The cache directory could not be created or inspected.
    #[error("workspace error: {0}")]
    Workspace(#[from] CacheError),
    /// The delegate fetch failed: network, auth, or unknown branch.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[source] GitError),
    /// The delegate archive failed after the retry budget was spent: the
    /// commit is unavailable or the tree path is invalid.
    #[error("archive export failed: {0}")]
    Archive(#[source] GitError),
    /// Short read/write while streaming, or the sink could not be opened.
    #[error("stream error: {0}")]
    Stream(#[source] ArchiveError),
}

impl FetchRequest {
    fn validate(&self) -> Result<(), FetchError> {
        if self.repo.is_empty() {
            return Err(FetchError::Validation("repo must not be empty".into()));
        }
        if self.branch.is_empty() {
            // The branch is needed even when the commit is known, because a
            // cache miss fetches by branch.
            return Err(FetchError::Validation(
                "branch must not be empty, even if the commit is known".into(),
            ));
        }
        if matches!(&self.commit, Some(commit) if commit.is_empty()) {
            return Err(FetchError::Validation("commit must not be empty".into()));
        }
        Ok(())
    }
}

/// Serve one request: ensure the mirror, resolve the commit if needed, and
/// stream a normalized archive, fetching and retrying once on a miss.
///
/// Returns the created file path when `output` is a directory. Output is not
/// buffered, so a failure after streaming began leaves the consumer with
/// truncated bytes; only the terminal result reports success.
pub fn fetch_archive(
    cache: &ArchiveCache,
    backend: &dyn GitBackend,
    request: &FetchRequest,
    output: Output<'_>,
) -> Result<Option<PathBuf>, FetchError> {
    request.validate()?;

    let workspace = cache.open_workspace(backend, &request.repo)?;

    let commit = match &request.commit {
        Some(commit) => commit.clone(),
        None => {
            let commit = workspace
                .resolve_head(backend, &request.repo, &request.branch)
                .map_err(FetchError::UpstreamFetch)?;
            debug!("Resolved {} to {commit}", request.branch);
            commit
        }
    };

    let mut file_path = None;
    let mut file_sink;
    let sink: &mut dyn Write = match output {
        Output::Stream(writer) => writer,
        Output::Directory(dir) => {
            let path = dir.join(format!("{commit}.{}", request.format.extension()));
            file_sink = File::create(&path)
                .map_err(|error| FetchError::Stream(ArchiveError::Io(error)))?;
            file_path = Some(path);
            &mut file_sink
        }
    };

    match request.format {
        Format::Tar => export_with_retry(backend, &workspace, request, &commit, sink)?,
        Format::Tgz => {
            let mut encoder = GzEncoder::new(sink, Compression::default());
            export_with_retry(backend, &workspace, request, &commit, &mut encoder)?;
            encoder
                .try_finish()
                .map_err(|error| FetchError::Stream(ArchiveError::Io(error)))?;
        }
    }

    Ok(file_path)
}

fn export_with_retry(
    backend: &dyn GitBackend,
    workspace: &crate::git::Workspace,
    request: &FetchRequest,
    commit: &str,
    sink: &mut dyn Write,
) -> Result<(), FetchError> {
    // Optimistically try the local mirror first: when the caller supplied a
    // commit it is usually already present, and a local archive attempt is
    // much cheaper than a network round-trip. Resolving the tip already
    // fetched, so that path never retries.
    let have_fetched = request.commit.is_none();
    match archive::export_tree(backend, workspace, commit, &request.tree, sink) {
        Ok(()) => Ok(()),
        Err(ArchiveError::Export(error)) if !have_fetched => {
            info!("Commit {commit} not in mirror ({error}), fetching and retrying once");
            workspace
                .fetch_upstream(backend, &request.repo, &request.branch)
                .map_err(FetchError::UpstreamFetch)?;
            match archive::export_tree(backend, workspace, commit, &request.tree, sink) {
                Ok(()) => Ok(()),
                Err(ArchiveError::Export(error)) => Err(FetchError::Archive(error)),
                Err(error) => Err(FetchError::Stream(error)),
            }
        }
        Err(ArchiveError::Export(error)) => Err(FetchError::Archive(error)),
        Err(error) => Err(FetchError::Stream(error)),
    }
}
