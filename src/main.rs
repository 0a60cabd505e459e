use std::error::Error;

use clap::Parser;

use treefetch::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::{do_clear_cache, do_fetch, do_serve},
    },
    config::TreefetchConfig,
    Treefetch,
};

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args = CliArgs::parse();
    let config = TreefetchConfig::load()?;

    let mut builder = Treefetch::builder();
    if let Some(cache_directory) = cli_args.cache_directory.or(config.cache_dir) {
        builder = builder.cache_directory(cache_directory);
    }
    let treefetch = builder.try_build()?;

    match cli_args.cmd {
        Command::Fetch {
            repo,
            branch,
            commit,
            tree,
            format,
            out_dir,
        } => do_fetch(
            &treefetch,
            repo,
            branch,
            commit,
            tree,
            &format,
            out_dir.as_deref(),
        ),
        Command::Serve { bind } => do_serve(&treefetch, bind, config.server_bind),
        Command::ClearCache => do_clear_cache(&treefetch),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
