use std::{
    io::{self, Read, Write},
    str::FromStr,
};

use thiserror::Error;

use crate::git::{GitBackend, GitError, Workspace};

/// Output container for an exported tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Tar,
    Tgz,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Tar => "tar",
            Format::Tgz => "tgz",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Tar => "application/x-tar",
            Format::Tgz => "application/gzip",
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar" => Ok(Format::Tar),
            "tgz" => Ok(Format::Tgz),
            other => Err(format!("format must be tar or tgz, got {other:?}")),
        }
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The delegate tool failed to produce the archive, typically because the
    /// commit is not in the mirror. This is the signal that a fetch may help.
    #[error(transparent)]
    Export(GitError),
    #[error("archive entry truncated: expected {expected} bytes, copied {copied}")]
    Truncated { expected: u64, copied: u64 },
    #[error("IO error while rewriting archive: {0}")]
    Io(#[from] io::Error),
}

const BLOCK: usize = 512;
const ZERO_BLOCK: [u8; BLOCK] = [0; BLOCK];

/// Export `commit:tree` from the mirror into `sink` as a normalized tar
/// stream whose bytes depend only on (commit, tree).
///
/// The delegate's native tar output embeds local fetch timestamps, so the
/// stream is decoded record by record and every header's mtime is rewritten
/// to the epoch before re-emission. Records are copied one at a time with
/// exact lengths; the end-of-archive marker is written only once the delegate
/// exited successfully, so a failed attempt contributes no bytes to `sink`.
pub fn export_tree(
    backend: &dyn GitBackend,
    workspace: &Workspace,
    commit: &str,
    tree: &str,
    sink: &mut dyn Write,
) -> Result<(), ArchiveError> {
    let mut source = backend
        .export_tar(workspace.git_dir(), commit, tree)
        .map_err(ArchiveError::Export)?;

    rewrite_records(&mut source, sink)?;

    // Normal exit point on EOF; a non-zero status means the commit or tree
    // was not available and the bytes so far (none) are meaningless.
    source.finish().map_err(ArchiveError::Export)?;

    sink.write_all(&ZERO_BLOCK)?;
    sink.write_all(&ZERO_BLOCK)?;
    sink.flush()?;
    Ok(())
}

fn rewrite_records(source: &mut dyn Read, sink: &mut dyn Write) -> Result<(), ArchiveError> {
    let mut archive = tar::Archive::new(source);
    // Raw mode passes pax and long-name records through untouched, so the
    // rewritten stream keeps the delegate's record sequence exactly.
    for entry in archive.entries()?.raw(true) {
        let mut entry = entry?;

        let mut header = entry.header().clone();
        header.set_mtime(0);
        header.set_cksum();
        sink.write_all(header.as_bytes())?;

        let expected = header.entry_size()?;
        let copied = io::copy(&mut entry, sink)?;
        if copied != expected {
            return Err(ArchiveError::Truncated { expected, copied });
        }

        let partial = (expected % BLOCK as u64) as usize;
        if partial > 0 {
            sink.write_all(&ZERO_BLOCK[..BLOCK - partial])?;
        }
    }
    Ok(())
}
