use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};

/// Caching proxy that serves deterministic tar/tgz archives of git trees.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct CliArgs {
    #[command(subcommand)]
    pub cmd: Command,
    /// Directory to use for caching mirrors. May get quite large.
    #[arg(short, long)]
    pub cache_directory: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one archive and write it to stdout or to a directory
    Fetch {
        /// Repository to fetch from (URL or path)
        #[arg(long)]
        repo: String,
        /// Branch containing the commit; needed even when the commit is known
        #[arg(long)]
        branch: String,
        /// Commit to archive; resolved to the branch tip when omitted
        #[arg(long)]
        commit: Option<String>,
        /// Subtree to filter to; the whole tree by default
        #[arg(long, default_value = "")]
        tree: String,
        /// Output format: tar or tgz
        #[arg(long, default_value = "tgz")]
        format: String,
        /// Write `<commit>.<format>` under this directory instead of stdout
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Run the HTTP front end
    Serve {
        /// Address to bind the webserver to
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Delete the mirror cache
    ClearCache,
}
