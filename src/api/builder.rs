use std::{error::Error, path::PathBuf};

use home::home_dir;

use crate::{cache::ArchiveCache, Treefetch};

#[derive(Default)]
pub struct TreefetchBuilder {
    cache_directory_path: Option<PathBuf>,
}

impl TreefetchBuilder {
    /// Location of the mirror cache root.
    ///
    /// Defaults to `$HOME/.treefetch/cache`. May get quite large: mirrors are
    /// never evicted.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    pub fn try_build(self) -> Result<Treefetch, Box<dyn Error>> {
        let cache_directory = match self.cache_directory_path {
            Some(path) => path,
            None => default_cache_directory()?,
        };

        let cache = ArchiveCache::new(cache_directory)?;

        Ok(Treefetch::new(cache))
    }
}

fn default_cache_directory() -> Result<PathBuf, Box<dyn Error>> {
    let mut cache_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".treefetch/cache");
    Ok(cache_directory)
}
