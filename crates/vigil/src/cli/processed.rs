//! Processed-content command handlers.

use super::commands::ProcessedCommands;
use vigil::{ProcessedContentSet, VigilContext, VigilResult};

/// Handle processed-content commands.
pub fn handle_processed_command(context: &VigilContext, cmd: ProcessedCommands) -> VigilResult<()> {
    let mut processed = ProcessedContentSet::open(context.layout().processed_content());
    match cmd {
        ProcessedCommands::Forget { id } => {
            if processed.forget(&id) {
                println!("Forgot {}", id);
            } else {
                println!("{} was not processed", id);
            }
        }
        ProcessedCommands::Clear => {
            let cleared = processed.clear();
            println!("Cleared {} ids", cleared);
        }
        ProcessedCommands::Count => println!("{}", processed.len()),
    }
    Ok(())
}
