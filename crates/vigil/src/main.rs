//! Vigil CLI binary.
//!
//! This binary provides command-line access to Vigil's state:
//! - Inspect calendar-day and rolling-window usage
//! - Check or reset the admission state of an endpoint
//! - Evaluate a batch of feed items and manage the processed-content set

use clap::Parser;
use std::sync::Arc;
use vigil::{LoggingConfig, SystemClock, VigilConfig, VigilContext, init_logging};

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{
        Cli, Commands, check_endpoint, evaluate_file, handle_processed_command, reset_endpoint,
        show_status,
    };

    let _ = dotenvy::dotenv();

    // Parse command-line arguments
    let cli = Cli::parse();

    init_logging(
        &LoggingConfig::new()
            .with_verbose(cli.verbose)
            .with_json_logs(cli.json_logs),
    )?;

    let mut config = VigilConfig::resolve(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }
    let context = VigilContext::open(config, Arc::new(SystemClock))?;

    // Execute the requested command
    match cli.command {
        Commands::Status { format } => show_status(&context, format)?,
        Commands::Check { endpoint, format } => check_endpoint(&context, &endpoint, format)?,
        Commands::Reset { endpoint } => reset_endpoint(&context, &endpoint)?,
        Commands::Evaluate { items, format } => evaluate_file(&context, &items, format)?,
        Commands::Processed(cmd) => handle_processed_command(&context, cmd)?,
    }

    context.flush()?;
    Ok(())
}
