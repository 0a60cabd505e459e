pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod git;
pub mod server;

pub mod flock;

mod api;

pub use api::{Treefetch, TreefetchBuilder};
