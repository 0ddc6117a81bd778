//! Serialization of feed content into the on-disk multi-file layout.
//!
//! One file per non-empty collection plus a `gbfs.json` index that lists
//! exactly the feeds written. Writing is not transactional: a failure midway
//! leaves the files written so far in place.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, error, info};

use crate::model::{FeedContent, Record, is_present, str_field};
use crate::schema::{SchemaProfile, SchemaVersion};

const INDEX_FEED: &str = "gbfs";
const DEFAULT_FEED_LANGUAGE: &str = "en";

/// Writes feeds using the conventions of one schema version.
pub struct FeedWriter {
    profile: &'static SchemaProfile,
}

impl FeedWriter {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            profile: version.profile(),
        }
    }

    /// Writes all present collections to `dest_dir` and returns the names of
    /// the feeds listed in the index.
    ///
    /// Station information and station status are only written as a pair;
    /// if exactly one of them is present, neither is written and an error is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot
    /// be written.
    #[tracing::instrument(skip(self, content), fields(version = self.profile.version, dest = %dest_dir.display()))]
    pub fn write_feed(
        &self,
        dest_dir: &Path,
        content: &FeedContent,
        base_url: &str,
        last_updated: i64,
        ttl: u32,
    ) -> Result<Vec<String>> {
        fs::create_dir_all(dest_dir)
            .with_context(|| format!("Failed to create feed directory {}", dest_dir.display()))?;

        let mut feeds: Vec<String> = Vec::new();
        let mut write = |name: &str, data: Value| -> Result<()> {
            self.write_file(dest_dir, name, data, last_updated, ttl)?;
            feeds.push(name.to_string());
            Ok(())
        };

        write(
            "system_information",
            Value::Object(content.system_information.clone()),
        )?;

        match (
            is_present(&content.station_information),
            is_present(&content.station_status),
        ) {
            (true, true) => {
                write(
                    "station_information",
                    json!({ "stations": content.station_information }),
                )?;
                write(
                    "station_status",
                    json!({ "stations": content.station_status }),
                )?;
            }
            (false, false) => {}
            (has_information, has_status) => {
                error!(
                    has_information,
                    has_status,
                    "Station information and station status must be provided together, skipping station feeds"
                );
            }
        }

        if is_present(&content.vehicles) {
            let mut data = serde_json::Map::new();
            data.insert(
                self.profile.vehicle_status_key.to_string(),
                json!(content.vehicles),
            );
            write(self.profile.vehicle_status_feed, Value::Object(data))?;
        }

        if is_present(&content.vehicle_types) {
            write(
                "vehicle_types",
                json!({ "vehicle_types": content.vehicle_types }),
            )?;
        }

        if is_present(&content.geofencing_zones) {
            write(
                "geofencing_zones",
                json!({
                    "geofencing_zones": {
                        "type": "FeatureCollection",
                        "features": content.geofencing_zones,
                    }
                }),
            )?;
        }

        if is_present(&content.pricing_plans) {
            write(
                "system_pricing_plans",
                json!({ "plans": content.pricing_plans }),
            )?;
        }

        if is_present(&content.alerts) {
            write("system_alerts", json!({ "alerts": content.alerts }))?;
        }

        let entries: Vec<(String, String)> = feeds
            .iter()
            .map(|name| (name.clone(), format!("{base_url}/{name}.json")))
            .collect();
        let language = feed_language(&content.system_information);
        self.write_file(
            dest_dir,
            INDEX_FEED,
            self.profile.index(language, &entries),
            last_updated,
            ttl,
        )?;

        info!(feeds = feeds.len(), "Feed written");
        Ok(feeds)
    }

    fn write_file(
        &self,
        dest_dir: &Path,
        name: &str,
        data: Value,
        last_updated: i64,
        ttl: u32,
    ) -> Result<()> {
        let path = dest_dir.join(format!("{name}.json"));
        debug!(path = %path.display(), "Writing feed file");

        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(
            &mut writer,
            &self.profile.envelope(data, last_updated, ttl),
        )?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }
}

/// Language the 2.3 index groups its feeds under.
fn feed_language(system_information: &Record) -> &str {
    str_field(system_information, "language")
        .or_else(|| {
            system_information
                .get("languages")
                .and_then(Value::as_array)
                .and_then(|l| l.first())
                .and_then(Value::as_str)
        })
        .unwrap_or(DEFAULT_FEED_LANGUAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record;
    use crate::testing::capture_logs;
    use tempfile::TempDir;

    fn read_json(dir: &Path, name: &str) -> Value {
        let content = fs::read_to_string(dir.join(name)).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    fn full_content() -> FeedContent {
        FeedContent {
            system_information: record(json!({"system_id": "s", "language": "de", "name": "S"})),
            station_information: Some(vec![record(json!({"station_id": "S1"}))]),
            station_status: Some(vec![record(json!({"station_id": "S1", "num_bikes_available": 0}))]),
            vehicle_types: Some(vec![record(json!({"vehicle_type_id": "bike"}))]),
            vehicles: Some(vec![record(json!({"bike_id": "v1"}))]),
            geofencing_zones: Some(vec![record(json!({"type": "Feature", "properties": {}}))]),
            pricing_plans: Some(vec![record(json!({"plan_id": "basic"}))]),
            alerts: Some(vec![]),
        }
    }

    #[test]
    fn test_v2_feed_layout() {
        let dir = TempDir::new().unwrap();
        let feeds = FeedWriter::new(SchemaVersion::V2_3)
            .write_feed(dir.path(), &full_content(), "https://x/feed", 100, 60)
            .unwrap();

        assert_eq!(
            feeds,
            vec![
                "system_information",
                "station_information",
                "station_status",
                "free_bike_status",
                "vehicle_types",
                "geofencing_zones",
                "system_pricing_plans",
            ]
        );
        assert!(!dir.path().join("system_alerts.json").exists());

        let bikes = read_json(dir.path(), "free_bike_status.json");
        assert_eq!(bikes["data"]["bikes"][0]["bike_id"], json!("v1"));
        assert_eq!(bikes["last_updated"], json!(100));
        assert_eq!(bikes["version"], json!("2.3"));

        let index = read_json(dir.path(), "gbfs.json");
        let listed = index["data"]["de"]["feeds"].as_array().unwrap();
        assert_eq!(listed.len(), feeds.len());
        assert_eq!(
            listed[3]["url"],
            json!("https://x/feed/free_bike_status.json")
        );

        let zones = read_json(dir.path(), "geofencing_zones.json");
        assert_eq!(
            zones["data"]["geofencing_zones"]["type"],
            json!("FeatureCollection")
        );
    }

    #[test]
    fn test_v3_feed_layout() {
        let dir = TempDir::new().unwrap();
        let feeds = FeedWriter::new(SchemaVersion::V3_0)
            .write_feed(dir.path(), &full_content(), "https://x/feed", 0, 30)
            .unwrap();

        assert!(feeds.contains(&"vehicle_status".to_string()));
        assert!(!dir.path().join("free_bike_status.json").exists());

        let vehicles = read_json(dir.path(), "vehicle_status.json");
        assert_eq!(vehicles["data"]["vehicles"][0]["bike_id"], json!("v1"));
        assert_eq!(vehicles["last_updated"], json!("1970-01-01T00:00:00Z"));
        assert_eq!(vehicles["ttl"], json!(30));
        assert_eq!(vehicles["version"], json!("3.0"));

        let index = read_json(dir.path(), "gbfs.json");
        assert_eq!(
            index["data"]["feeds"][0],
            json!({"name": "system_information", "url": "https://x/feed/system_information.json"})
        );
    }

    fn assert_partial_station_data_skipped(content: FeedContent) {
        let dir = TempDir::new().unwrap();

        let (feeds, logs) = capture_logs(|| {
            FeedWriter::new(SchemaVersion::V2_3)
                .write_feed(dir.path(), &content, "https://x", 0, 60)
                .unwrap()
        });

        assert!(!dir.path().join("station_information.json").exists());
        assert!(!dir.path().join("station_status.json").exists());
        assert!(!feeds.iter().any(|f| f.starts_with("station_")));
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("must be provided together"), "{logs}");
    }

    #[test]
    fn test_station_information_without_status_writes_no_station_files() {
        assert_partial_station_data_skipped(FeedContent {
            station_status: None,
            ..full_content()
        });
    }

    #[test]
    fn test_station_status_without_information_writes_no_station_files() {
        assert_partial_station_data_skipped(FeedContent {
            system_information: record(json!({"system_id": "s"})),
            station_status: Some(vec![record(json!({"station_id": "S1"}))]),
            ..FeedContent::default()
        });
    }

    #[test]
    fn test_system_information_only() {
        let dir = TempDir::new().unwrap();
        let content = FeedContent {
            system_information: record(json!({"system_id": "s"})),
            ..FeedContent::default()
        };

        let feeds = FeedWriter::new(SchemaVersion::V2_3)
            .write_feed(dir.path(), &content, "https://x", 0, 60)
            .unwrap();

        assert_eq!(feeds, vec!["system_information"]);
        let index = read_json(dir.path(), "gbfs.json");
        assert_eq!(index["data"]["en"]["feeds"].as_array().unwrap().len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_filesystem_error_propagates() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "not a directory").unwrap();

        let result = FeedWriter::new(SchemaVersion::V2_3).write_feed(
            &blocker.join("feed"),
            &full_content(),
            "https://x",
            0,
            60,
        );
        assert!(result.is_err());
    }
}
