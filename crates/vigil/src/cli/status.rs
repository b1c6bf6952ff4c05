//! Admission status command handlers.

use super::commands::OutputFormat;
use super::print_json;
use vigil::{
    Admission, EndpointCheck, EndpointId, SearchStrategy, StatusReport, VigilContext, VigilResult,
};

/// Print usage of both controllers and the posting outlook.
pub fn show_status(context: &VigilContext, format: OutputFormat) -> VigilResult<()> {
    let report = context.status()?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Human => {
            print_report(&report);
            Ok(())
        }
    }
}

fn print_report(report: &StatusReport) {
    let free_tier = &report.free_tier;
    println!(
        "Free tier: {}/{} calls today, next reset {}",
        free_tier.total_used_today, free_tier.total_daily_quota, free_tier.next_reset
    );
    println!("{:-<80}", "");
    for (endpoint, status) in &free_tier.endpoints {
        let availability = if status.can_request {
            "available".to_string()
        } else {
            format!("{} (next in {}s)", status.reason, status.next_available_in_secs)
        };
        println!(
            "{:<16} {:>3}/{:<3} failures {:<2} {}",
            endpoint, status.used, status.quota, status.consecutive_failures, availability
        );
    }

    match &report.search_strategy {
        SearchStrategy::Search {
            remaining_quota_today,
            delay_between_searches_secs,
            ..
        } => println!(
            "\nSearch: go ({} left today, {}s between searches)",
            remaining_quota_today, delay_between_searches_secs
        ),
        SearchStrategy::Wait {
            reason,
            next_in_secs,
            ..
        } => println!("\nSearch: wait {}s ({})", next_in_secs, reason),
    }

    println!("\nRolling windows:");
    println!("{:-<80}", "");
    for usage in &report.usage {
        let backoff = match usage.backoff_remaining_secs {
            0 => String::new(),
            secs => format!(" backoff {}s", secs),
        };
        println!(
            "{:<16} {:<5} {:>5}/{:<5} {:>5.1}% resets {}{}",
            usage.endpoint,
            usage.class,
            usage.calls_made,
            usage.limit,
            usage.efficiency * 100.0,
            usage.window_reset.format("%H:%M:%S"),
            backoff
        );
    }

    let outlook = &report.outlook;
    println!("\nPosting outlook:");
    println!("  window:          {}", outlook.engagement_window);
    println!("  next post:       {}", outlook.next_optimal_post_time);
    println!("  posts remaining: {}", outlook.daily_posts_remaining);
    println!("  cache hit rate:  {:.1}%", outlook.cache_hit_rate * 100.0);
    println!("  queued requests: {}", outlook.queue_size);
    if !outlook.endpoints_in_backoff.is_empty() {
        let names: Vec<&str> = outlook
            .endpoints_in_backoff
            .iter()
            .map(EndpointId::as_str)
            .collect();
        println!("  in backoff:      {}", names.join(", "));
    }
}

/// Print both controllers' verdict for one endpoint.
pub fn check_endpoint(
    context: &VigilContext,
    endpoint: &str,
    format: OutputFormat,
) -> VigilResult<()> {
    let check = context.check(&EndpointId::from(endpoint))?;
    match format {
        OutputFormat::Json => print_json(&check),
        OutputFormat::Human => {
            print_check(&check);
            Ok(())
        }
    }
}

fn print_check(check: &EndpointCheck) {
    println!("{}", check.endpoint);
    match (&check.calendar, check.calendar_remaining) {
        (Some(admission), Some(remaining)) => println!(
            "  calendar day:   {} ({} left today)",
            verdict(admission),
            remaining
        ),
        _ => println!("  calendar day:   no daily quota configured"),
    }
    println!(
        "  rolling window: {} ({} left in window)",
        verdict(&check.rolling),
        check.rolling_remaining
    );
}

fn verdict(admission: &Admission) -> String {
    match admission {
        Admission::Admitted => "admitted".to_string(),
        Admission::Denied(reason) => format!("denied: {}", reason),
    }
}

/// Clear the calendar state of one endpoint.
pub fn reset_endpoint(context: &VigilContext, endpoint: &str) -> VigilResult<()> {
    context.calendar().force_reset(&EndpointId::from(endpoint))?;
    println!("Reset {}", endpoint);
    Ok(())
}
