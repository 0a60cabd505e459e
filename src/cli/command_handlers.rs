use std::{error::Error, io::Write, net::SocketAddr, path::Path};

use log::info;

use crate::{
    archive::Format,
    fetch::{FetchError, FetchRequest},
    Treefetch,
};

const DEFAULT_BIND: &str = "0.0.0.0:9091";

/// Handler for the fetch command. Writes the archive to stdout, or to
/// `<commit>.<format>` under `out_dir`, announcing the chosen path on stdout.
pub fn do_fetch(
    treefetch: &Treefetch,
    repo: String,
    branch: String,
    commit: Option<String>,
    tree: String,
    format: &str,
    out_dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let format: Format = format.parse().map_err(FetchError::Validation)?;
    let request = FetchRequest {
        repo,
        branch,
        commit,
        tree,
        format,
    };

    match out_dir {
        Some(out_dir) => {
            let path = treefetch.fetch_to_dir(&request, out_dir)?;
            info!("Wrote archive to {}", path.display());
            println!("{}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut stdout = stdout.lock();
            treefetch.fetch(&request, &mut stdout)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Handler for the serve command.
pub fn do_serve(
    treefetch: &Treefetch,
    bind: Option<SocketAddr>,
    config_bind: Option<SocketAddr>,
) -> Result<(), Box<dyn Error>> {
    let bind = bind
        .or(config_bind)
        .unwrap_or_else(|| DEFAULT_BIND.parse().expect("default bind address parses"));
    treefetch.serve(bind)?;
    Ok(())
}

pub fn do_clear_cache(treefetch: &Treefetch) -> Result<(), Box<dyn Error>> {
    treefetch.clear_cache()?;
    Ok(())
}
