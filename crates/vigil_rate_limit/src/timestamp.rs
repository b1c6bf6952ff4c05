//! Lenient reading of stored instants.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInstant {
    UnixSeconds(f64),
    Text(String),
}

impl RawInstant {
    fn into_utc<E: Error>(self) -> Result<DateTime<Utc>, E> {
        match self {
            Self::UnixSeconds(secs) if secs.is_finite() => {
                DateTime::from_timestamp_micros((secs * 1e6).round() as i64)
                    .ok_or_else(|| E::custom(format!("timestamp {} out of range", secs)))
            }
            Self::UnixSeconds(secs) => Err(E::custom(format!("timestamp {} out of range", secs))),
            Self::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                        .map(|naive| naive.and_utc())
                })
                .map_err(|e| E::custom(format!("invalid timestamp '{}': {}", text, e))),
        }
    }
}

/// Optional instant stored as RFC 3339 text or as unix seconds.
///
/// Text without an offset is read as UTC.
pub(crate) fn optional_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawInstant>::deserialize(deserializer)?
        .map(RawInstant::into_utc)
        .transpose()
}
