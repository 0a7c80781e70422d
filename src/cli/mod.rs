//! Command-line interface for songkeeper.
//!
//! `update` runs a reconciliation and speaks the progress protocol on
//! stdout. `preview` and `config` are for inspecting a setup by hand.

mod commands;

pub use commands::{Cli, Commands, run_command};
