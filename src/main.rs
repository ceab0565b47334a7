mod agent;
mod car;
mod config;
mod control;
mod engine;
mod episode;
mod events;
mod manager;
mod policy;
mod population;
mod stats;
mod track;

use crate::config::Config;
use crate::manager::{Manager, RunOptions};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// TOML configuration file (defaults are used if omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the simulation, reading commands from stdin and writing events to stdout.
    Run {
        #[arg(long)]
        max_generations: Option<u64>,

        #[arg(long)]
        record: Option<PathBuf>,

        #[arg(long)]
        quiet: bool,
    },

    /// Validate the configuration and print it.
    Check,

    /// Print the default configuration.
    DefaultConfig,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    match args.command {
        Command::Run {
            max_generations,
            record,
            quiet,
        } => {
            let mgr = Manager::new(args.config.as_deref()).context("failed to construct mgr")?;
            mgr.run_simulation(RunOptions {
                max_generations,
                record,
                quiet,
            })?;
        }
        Command::Check => {
            let mgr = Manager::new(args.config.as_deref()).context("failed to construct mgr")?;
            print!("{}", mgr.cfg().to_toml()?);
        }
        Command::DefaultConfig => print!("{}", Config::default().to_toml()?),
    }

    Ok(())
}
