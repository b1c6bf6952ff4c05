//! Offline evaluation of a feed batch.

use super::commands::OutputFormat;
use super::print_json;
use std::path::Path;
use tracing::{info, instrument};
use vigil::{
    ContentItem, JsonError, StorageError, StorageErrorKind, VigilContext, VigilResult,
};

/// Read a JSON array of feed items.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not an array of items.
pub fn read_items(path: &Path) -> VigilResult<Vec<ContentItem>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        StorageError::new(StorageErrorKind::FileRead(format!(
            "{}: {}",
            path.display(),
            e
        )))
    })?;
    let items = serde_json::from_str(&raw).map_err(|e| {
        JsonError::new(format!("Failed to parse items in {}: {}", path.display(), e))
    })?;
    Ok(items)
}

/// Run the evaluator over the items in `path` and print what it accepted.
///
/// Accepted ids are added to the processed set, exactly as during monitoring.
#[instrument(skip(context), fields(items = %path.display()))]
pub fn evaluate_file(context: &VigilContext, path: &Path, format: OutputFormat) -> VigilResult<()> {
    let items = read_items(path)?;
    let mut evaluator = context.open_evaluator();
    let tiers = context.config().monitor().tier_map();
    let opportunities = evaluator.evaluate(&items, &tiers);
    info!(
        read = items.len(),
        accepted = opportunities.len(),
        "Evaluated batch"
    );

    match format {
        OutputFormat::Json => print_json(&opportunities),
        OutputFormat::Human => {
            for opportunity in &opportunities {
                let marker = if opportunity.is_high_priority() { "!" } else { " " };
                println!(
                    "{} {:.2} [tier {}] @{} {}: {}",
                    marker,
                    opportunity.relevance_score(),
                    opportunity.tier().number(),
                    opportunity.account(),
                    opportunity.content_id(),
                    opportunity.text()
                );
            }
            println!(
                "Accepted {} of {} items",
                opportunities.len(),
                items.len()
            );
            Ok(())
        }
    }
}
