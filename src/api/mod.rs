use std::{
    io::Write,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    cache::ArchiveCache,
    fetch::{self, FetchError, FetchRequest, Output},
    git::GitCli,
    server::{self, AppState},
};

mod builder;

pub use builder::TreefetchBuilder;

/// Embeddable entry point wrapping the cache and the git delegate.
pub struct Treefetch {
    cache: Arc<ArchiveCache>,
    backend: Arc<GitCli>,
}

impl Treefetch {
    pub fn builder() -> TreefetchBuilder {
        TreefetchBuilder::default()
    }

    pub(crate) fn new(cache: ArchiveCache) -> Self {
        Treefetch {
            cache: Arc::new(cache),
            backend: Arc::new(GitCli::new()),
        }
    }

    /// Serve one request, streaming the archive into `sink`.
    pub fn fetch(&self, request: &FetchRequest, sink: &mut dyn Write) -> Result<(), FetchError> {
        fetch::fetch_archive(
            &self.cache,
            self.backend.as_ref(),
            request,
            Output::Stream(sink),
        )?;
        Ok(())
    }

    /// Serve one request, writing `<commit>.<format>` under `out_dir` and
    /// returning the created path.
    pub fn fetch_to_dir(
        &self,
        request: &FetchRequest,
        out_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let path = fetch::fetch_archive(
            &self.cache,
            self.backend.as_ref(),
            request,
            Output::Directory(out_dir),
        )?;
        Ok(path.expect("directory output always yields a path"))
    }

    /// Run the HTTP front end until interrupted.
    pub fn serve(&self, bind: SocketAddr) -> anyhow::Result<()> {
        let state = AppState {
            cache: self.cache.clone(),
            backend: self.backend.clone(),
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(server::serve(bind, state))
    }

    /// Delete the cache root; mirrors are recreated on demand.
    pub fn clear_cache(&self) -> anyhow::Result<()> {
        self.cache.clear()
    }
}
