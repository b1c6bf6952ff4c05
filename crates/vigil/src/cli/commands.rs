//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vigil - quota-aware admission and strategic account monitoring
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(about = "Quota-aware admission and strategic account monitoring", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file used instead of ./vigil.toml and ~/.config/vigil/vigil.toml
    #[arg(long, global = true, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory, overriding the configured one
    #[arg(long, global = true, env = "VIGIL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show free-tier usage, rolling-window analytics and the posting outlook
    Status {
        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Check whether a call to an endpoint would be admitted now
    Check {
        /// Endpoint name, e.g. search_tweets
        endpoint: String,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Clear today's usage, failures and backoff of a calendar endpoint
    Reset {
        /// Endpoint name
        endpoint: String,
    },

    /// Run the opportunity evaluator over a JSON array of feed items
    Evaluate {
        /// Path to the items file
        items: PathBuf,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Manage the processed-content set
    #[command(subcommand)]
    Processed(ProcessedCommands),
}

/// Processed-content subcommands
#[derive(Subcommand, Debug)]
pub enum ProcessedCommands {
    /// Forget one id so its content can be evaluated again
    Forget {
        /// Content id
        id: String,
    },

    /// Forget every id
    Clear,

    /// Print how many ids are remembered
    Count,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// Pretty-printed JSON
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "vigil",
            "check",
            "search_tweets",
            "--format",
            "json",
            "--data-dir",
            "/tmp/vigil",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/vigil")));
        match cli.command {
            Commands::Check { endpoint, format } => {
                assert_eq!(endpoint, "search_tweets");
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn processed_subcommands_parse() {
        let cli = Cli::try_parse_from(["vigil", "processed", "forget", "1790"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Processed(ProcessedCommands::Forget { ref id }) if id == "1790"
        ));
    }
}
