//! Vigil: quota-aware request admission and strategic account monitoring.
//!
//! Vigil decides whether a call to a rate-limited social API may be made
//! now, remembers what it learned across restarts, and turns the posts of
//! strategic accounts into scored engagement opportunities.
//!
//! # Crates
//!
//! - [`vigil_rate_limit`]: rolling-window and calendar-day admission
//!   controllers, the request dispatcher and header detection
//! - [`vigil_monitor`]: the account monitor, evaluator and scorer
//! - [`vigil_cache`]: the TTL request cache
//! - [`vigil_storage`]: versioned JSON documents under the data directory
//! - [`vigil_core`] and [`vigil_error`]: shared types and errors
//!
//! # Example
//!
//! ```no_run
//! use vigil::{SystemClock, VigilConfig, VigilContext};
//! use std::sync::Arc;
//!
//! # fn main() -> vigil::VigilResult<()> {
//! let context = VigilContext::open(VigilConfig::load()?, Arc::new(SystemClock))?;
//! let status = context.status()?;
//! println!("{} calls used today", status.free_tier.total_used_today);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod observability;

pub use config::VigilConfig;
pub use context::{EndpointCheck, StatusReport, VigilContext};
pub use observability::{LoggingConfig, init_logging};

// Re-export the member crates
pub use vigil_cache::*;
pub use vigil_core::*;
pub use vigil_error::*;
pub use vigil_monitor::*;
pub use vigil_rate_limit::*;
pub use vigil_storage::*;
