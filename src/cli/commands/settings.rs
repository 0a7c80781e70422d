//! Configuration command.

use anyhow::Context;

use crate::config;

/// Print the effective configuration, or write it out with `init`.
pub fn cmd_config(init: bool) -> anyhow::Result<()> {
    let config = config::load();

    if init {
        let path = config::save(&config)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    match config::config_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config directory"),
    }
    let text = toml::to_string_pretty(&config).context("serializing config")?;
    print!("{text}");
    Ok(())
}
