//! CLI command definitions and dispatch.
//!
//! Each subcommand lives in its own submodule:
//! - `update`: database reconciliation
//! - `preview`: organized path for a single file
//! - `settings`: show or initialise the configuration file

mod preview;
mod settings;
mod update;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::reconcile::Mode;

pub use preview::cmd_preview;
pub use settings::cmd_config;
pub use update::cmd_update;

/// Songkeeper CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the song database with the music directory
    Update(UpdateArgs),
    /// Show where a file would be organized to
    Preview {
        /// Path to the audio file
        path: PathBuf,
        /// Music directory (defaults to the configured one)
        #[arg(long)]
        music_dir: Option<PathBuf>,
    },
    /// Show the configuration
    Config {
        /// Write the current settings (defaults if none) to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// check-new, rebuild, compact, update-tags, update-itunes, write-tags
    /// or reorganize
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Mode,
    /// Also pick up new files while compacting
    #[arg(long)]
    pub check_new: bool,
    /// Scan this directory instead of the whole music directory
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Music directory (overrides the config file)
    #[arg(long, env = "SONGKEEPER_MUSIC_DIR")]
    pub music_dir: Option<PathBuf>,
    /// Song database (overrides the config file)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// JSON export of iTunes fields, for update-itunes
    #[arg(long)]
    pub itunes: Option<PathBuf>,
}

fn parse_mode(value: &str) -> Result<Mode, String> {
    value.parse().map_err(|e: crate::error::Error| e.to_string())
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    let result = match &cli.command {
        Commands::Update(args) => cmd_update(&rt, args),
        Commands::Preview { path, music_dir } => cmd_preview(path, music_dir.as_deref()),
        Commands::Config { init } => cmd_config(*init),
    };

    // The stdin reader may still be parked on a blocking read
    rt.shutdown_background();
    result
}
