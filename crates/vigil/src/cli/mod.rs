//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the vigil binary.

mod commands;
mod evaluate;
mod processed;
mod status;

pub use commands::{Cli, Commands};
pub use evaluate::evaluate_file;
pub use processed::handle_processed_command;
pub use status::{check_endpoint, reset_endpoint, show_status};

use serde::Serialize;
use vigil::{JsonError, VigilResult};

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> VigilResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| JsonError::new(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
