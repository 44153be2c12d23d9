//! Configuration CLI commands.
//!
//! Provides `config path` and `config show` for inspecting the settings the
//! other commands run with.

use clap::Subcommand;
use runwatch::config::config_file_path;

use crate::error::CliError;
use crate::runner::{resolve_config, GlobalOptions};

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration, after command-line overrides
    Show,
}

/// Run a config subcommand.
pub fn run(options: &GlobalOptions, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(options),
        ConfigCommands::Show => run_show(options),
    }
}

fn run_path(options: &GlobalOptions) -> Result<(), CliError> {
    let path = match &options.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    println!("{}", path.display());
    Ok(())
}

fn run_show(options: &GlobalOptions) -> Result<(), CliError> {
    let config = resolve_config(options)?;
    let mut out = Vec::new();
    config
        .to_ini()
        .write_to(&mut out)
        .map_err(|e| CliError::Config(format!("Failed to render configuration: {}", e)))?;
    print!("{}", String::from_utf8_lossy(&out));
    Ok(())
}
