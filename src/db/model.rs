//! Row models used by repositories.

use chrono::{DateTime, TimeZone, Utc};

/// One delivered article. `url` is unique; `timestamp` is epoch seconds.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SentRecord {
    pub url: String,
    pub timestamp: f64,
}

impl SentRecord {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let millis = (self.timestamp * 1000.0).round() as i64;
        Utc.timestamp_millis_opt(millis).single()
    }
}

/// Epoch seconds with millisecond precision, the unit stored in `sent_items`.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}
