//! Songkeeper - keeps a song database in step with a music library.
//!
//! Files are organized into a directory layout generated from their tags,
//! and the database is reconciled with the files on disk. Progress is
//! reported on stdout as protocol lines so a managing process can follow a
//! run; logs go to stderr.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod itunes;
pub mod metadata;
pub mod model;
pub mod organizer;
pub mod reconcile;
pub mod reference;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logging goes to stderr, stdout carries protocol lines
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("songkeeper=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
