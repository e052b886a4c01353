//! Monitor domain types

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::domain::job::JobState;

/// Chat user who asked for a notification
pub type SubscriberId = i64;

/// Chat the notification is pushed to
pub type DeliveryTarget = i64;

/// A subscription to one job's completion
///
/// Serialized field names match the registry files written by earlier
/// releases of the bot (`user_id`, `chat_id`, `last_state`, `added_time`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEntry {
    #[serde(skip)]
    pub job_id: String,

    #[serde(rename = "user_id")]
    pub subscriber_id: SubscriberId,

    #[serde(rename = "chat_id")]
    pub delivery_target: DeliveryTarget,

    #[serde(rename = "last_state")]
    pub last_observed_state: JobState,

    #[serde(rename = "added_time", with = "timestamp")]
    pub created_at: NaiveDateTime,
}

impl MonitorEntry {
    /// Creates an entry stamped with the current local time
    ///
    /// The timestamp is truncated to whole seconds so that it survives a
    /// save/load cycle unchanged.
    pub fn new(
        job_id: impl Into<String>,
        subscriber_id: SubscriberId,
        delivery_target: DeliveryTarget,
        state: JobState,
    ) -> Self {
        let now = chrono::Local::now().naive_local();
        Self {
            job_id: job_id.into(),
            subscriber_id,
            delivery_target,
            last_observed_state: state,
            created_at: now.with_nanosecond(0).unwrap_or(now),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` timestamps in local time
mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
