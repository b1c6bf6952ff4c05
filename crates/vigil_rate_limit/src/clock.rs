//! Wall clock driven by the tokio timer.

use chrono::{DateTime, Utc};
use vigil_core::{Clock, add_duration};

/// Clock that advances with `tokio::time`.
///
/// The wall time is anchored once and then moved forward by the tokio
/// monotonic clock. Under a paused runtime the clock follows the virtual
/// time that `sleep` auto-advances, which keeps the polling loops and the
/// admission arithmetic on the same timeline.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor the clock at `anchor` now.
    ///
    /// Must be called inside a tokio runtime.
    pub fn starting_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }

    /// Anchor the clock at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        add_duration(self.anchor, self.started.elapsed())
    }
}
