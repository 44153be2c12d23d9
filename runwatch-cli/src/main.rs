//! Runwatch CLI - command-line view of experiment runs
//!
//! Reads runs through the adaptive cache in the `runwatch` library, the same
//! way a dashboard backend would.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;
mod error;
mod runner;

use commands::config::ConfigCommands;
use error::CliError;
use runner::GlobalOptions;

#[derive(Debug, Parser)]
#[command(name = "runwatch", version, about = "Near-real-time view of experiment runs")]
struct Cli {
    /// Configuration file (default: ~/.runwatch/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Experiments root directory, overriding the config file
    #[arg(long, global = true, value_name = "PATH")]
    experiments: Option<PathBuf>,

    /// Analytics root directory, overriding the config file
    #[arg(long, global = true, value_name = "PATH")]
    analytics: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List runs, newest first
    Runs {
        /// Only runs of this experiment
        #[arg(long)]
        experiment: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one run in detail
    Show {
        /// Run id
        run_id: Uuid,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Poll all runs and print step changes until Ctrl+C
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let options = GlobalOptions {
        config: cli.config,
        experiments: cli.experiments,
        analytics: cli.analytics,
    };

    match cli.command {
        Commands::Runs { experiment, json } => {
            commands::runs::run_list(&options, experiment.as_deref(), json)
        }
        Commands::Show { run_id, json } => commands::runs::run_show(&options, run_id, json),
        Commands::Watch { interval } => commands::watch::run(&options, interval),
        Commands::Config { command } => commands::config::run(&options, command),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
