//! Local-time arithmetic for day boundaries and peak hours.

use chrono::{
    DateTime, Days, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike, Utc,
};
use std::time::Duration;
use vigil_error::ConfigError;

/// Time zone used to decide calendar days and hours of the day.
///
/// Defaults to the system zone; a fixed UTC offset pins the behavior
/// independently of the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalZone {
    /// Host time zone
    #[default]
    System,
    /// Fixed offset from UTC
    Fixed(FixedOffset),
}

impl LocalZone {
    /// Build a zone from an optional offset in minutes east of UTC.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is outside ±24 hours.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::LocalZone;
    ///
    /// assert_eq!(LocalZone::from_offset_minutes(None).unwrap(), LocalZone::System);
    /// assert!(LocalZone::from_offset_minutes(Some(120)).is_ok());
    /// assert!(LocalZone::from_offset_minutes(Some(24 * 60)).is_err());
    /// ```
    pub fn from_offset_minutes(minutes: Option<i32>) -> Result<Self, ConfigError> {
        match minutes {
            None => Ok(Self::System),
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(Self::Fixed)
                .ok_or_else(|| {
                    ConfigError::new(format!("UTC offset out of range: {} minutes", minutes))
                }),
        }
    }

    /// UTC zone.
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Calendar date of `now` in this zone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::System => now.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => now.with_timezone(offset).date_naive(),
        }
    }

    /// Hour of the day (0..24) of `now` in this zone.
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        match self {
            Self::System => now.with_timezone(&Local).hour(),
            Self::Fixed(offset) => now.with_timezone(offset).hour(),
        }
    }

    /// Start of the next local calendar day after `now`.
    pub fn next_local_midnight(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = self.local_date(now) + Days::new(1);
        let midnight = tomorrow.and_time(chrono::NaiveTime::MIN);
        self.resolve(midnight)
            .unwrap_or_else(|| add_duration(now, Duration::from_secs(24 * 3600)))
    }

    /// Earliest start of one of `hours` strictly after `now`.
    ///
    /// Looks at today and tomorrow. Returns `None` when `hours` holds no
    /// valid hour of the day.
    pub fn next_hour_start(&self, now: DateTime<Utc>, hours: &[u32]) -> Option<DateTime<Utc>> {
        let today = self.local_date(now);
        let mut sorted: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
        sorted.sort_unstable();
        sorted.dedup();
        [today, today + Days::new(1)]
            .into_iter()
            .flat_map(|date| {
                sorted
                    .iter()
                    .filter_map(move |hour| date.and_hms_opt(*hour, 0, 0))
            })
            .filter_map(|naive| self.resolve(naive))
            .find(|start| *start > now)
    }

    fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::System => earliest(Local.from_local_datetime(&naive)),
            Self::Fixed(offset) => earliest(offset.from_local_datetime(&naive)),
        }
    }
}

fn earliest<Tz: TimeZone>(result: LocalResult<DateTime<Tz>>) -> Option<DateTime<Utc>> {
    result.earliest().map(|dt| dt.with_timezone(&Utc))
}

/// `instant + by`, saturating at the largest representable instant.
pub fn add_duration(instant: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds from `now` until `until`, rounded up; zero once passed.
pub fn remaining_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let delta = until - now;
    if delta <= chrono::Duration::zero() {
        return 0;
    }
    let secs = delta.num_seconds().max(0) as u64;
    if delta.subsec_nanos() > 0 { secs + 1 } else { secs }
}
