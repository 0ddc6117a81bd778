//! Output schema versions and the per-version serialization profile.
//!
//! The two supported major revisions share one writer; everything that
//! differs between them is captured in a [`SchemaProfile`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// Major revision of the output feed format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaVersion {
    #[default]
    #[serde(rename = "2.3")]
    V2_3,
    #[serde(rename = "3.0")]
    V3_0,
}

impl SchemaVersion {
    pub fn profile(self) -> &'static SchemaProfile {
        match self {
            SchemaVersion::V2_3 => &V2_3_PROFILE,
            SchemaVersion::V3_0 => &V3_0_PROFILE,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().version)
    }
}

/// Version-specific naming and envelope conventions.
#[derive(Debug)]
pub struct SchemaProfile {
    /// Value of the envelope's `version` marker.
    pub version: &'static str,
    /// Feed (and file) name of the vehicle-status feed.
    pub vehicle_status_feed: &'static str,
    /// Payload key holding the vehicle list inside the vehicle-status feed.
    pub vehicle_status_key: &'static str,
    /// Renders the envelope's `last_updated` from epoch seconds.
    pub format_last_updated: fn(i64) -> Value,
    /// Whether the index file groups its feed list under a language key.
    pub group_index_by_language: bool,
}

pub static V2_3_PROFILE: SchemaProfile = SchemaProfile {
    version: "2.3",
    vehicle_status_feed: "free_bike_status",
    vehicle_status_key: "bikes",
    format_last_updated: epoch_value,
    group_index_by_language: true,
};

pub static V3_0_PROFILE: SchemaProfile = SchemaProfile {
    version: "3.0",
    vehicle_status_feed: "vehicle_status",
    vehicle_status_key: "vehicles",
    format_last_updated: iso_value,
    group_index_by_language: false,
};

impl SchemaProfile {
    /// Wraps a payload in the envelope every feed file shares.
    pub fn envelope(&self, data: Value, last_updated: i64, ttl: u32) -> Value {
        json!({
            "data": data,
            "last_updated": (self.format_last_updated)(last_updated),
            "ttl": ttl,
            "version": self.version,
        })
    }

    /// Builds the index payload from `(feed_name, url)` entries.
    pub fn index(&self, language: &str, feeds: &[(String, String)]) -> Value {
        let feeds: Vec<Value> = feeds
            .iter()
            .map(|(name, url)| json!({"name": name, "url": url}))
            .collect();

        if self.group_index_by_language {
            let mut grouped = Map::new();
            grouped.insert(language.to_string(), json!({ "feeds": feeds }));
            Value::Object(grouped)
        } else {
            json!({ "feeds": feeds })
        }
    }
}

fn epoch_value(epoch: i64) -> Value {
    Value::from(epoch)
}

fn iso_value(epoch: i64) -> Value {
    Value::from(iso_timestamp(epoch))
}

/// Formats epoch seconds as an ISO-8601 UTC timestamp with a `Z` suffix.
///
/// Out-of-range inputs clamp to the Unix epoch.
pub fn iso_timestamp(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Today's date (UTC) as `YYYY-MM-DD`.
pub fn iso_today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}
