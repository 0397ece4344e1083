//! fleetsync CLI - Command-line interface
//!
//! Runs per-account refresh coordinators, inspects the refresh schedule and
//! manages the configuration file.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fleetsync::config::config_file_path;

use commands::config::ConfigCommands;
use commands::run::RunArgs;
use commands::schedule::ScheduleArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "fleetsync", version, about = "Rate-limited, quiet-hours aware vehicle telemetry polling")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run coordinators for the configured accounts
    Run {
        /// JSON fleet fixture served by the simulated backend
        #[arg(long, value_name = "FILE")]
        simulate: PathBuf,

        /// Only run these accounts (repeatable)
        #[arg(long = "account", value_name = "NAME")]
        accounts: Vec<String>,

        /// Simulated API latency in milliseconds
        #[arg(long, default_value_t = 250)]
        latency_ms: u64,

        /// Seconds between status lines
        #[arg(long, default_value_t = 60)]
        status_interval: u64,
    },

    /// List configured accounts and their refresh policy
    Accounts,

    /// Show what the refresh strategy would do at a given time
    Schedule {
        /// Use this account's policy instead of [defaults]
        #[arg(long)]
        account: Option<String>,

        /// Evaluation time, 'YYYY-MM-DD HH:MM' or 'HH:MM' (default: now)
        #[arg(long)]
        at: Option<String>,

        /// Time of the last cached refresh
        #[arg(long)]
        last_cached: Option<String>,

        /// Time of the last forced refresh
        #[arg(long)]
        last_forced: Option<String>,
    },

    /// View or change configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    match cli.command {
        Commands::Run {
            simulate,
            accounts,
            latency_ms,
            status_interval,
        } => commands::run::run(
            RunArgs {
                fixture: simulate,
                accounts,
                latency_ms,
                status_interval_secs: status_interval,
            },
            &config_path,
        ),
        Commands::Accounts => commands::accounts::run(&config_path),
        Commands::Schedule {
            account,
            at,
            last_cached,
            last_forced,
        } => commands::schedule::run(
            ScheduleArgs {
                account,
                at,
                last_cached,
                last_forced,
            },
            &config_path,
        ),
        Commands::Config { command } => commands::config::run(command, &config_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_accounts() {
        let cli = Cli::try_parse_from([
            "fleetsync",
            "run",
            "--simulate",
            "fleet.json",
            "--account",
            "family",
            "--account",
            "work",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { accounts, simulate, .. } => {
                assert_eq!(accounts, vec!["family", "work"]);
                assert_eq!(simulate, PathBuf::from("fleet.json"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
