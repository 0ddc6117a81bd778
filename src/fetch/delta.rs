//! On-disk cache that merges incremental upstream responses over a baseline.
//!
//! Some upstreams publish a rate-limited full snapshot and a cheap delta
//! endpoint keyed by a global version counter. Three files are kept per
//! cache name:
//!
//! - `{name}_base.json`: the last full response, its mtime drives refreshes
//! - `{name}_delta.json`: the last raw response
//! - `{name}_latest.json`: the merged document, source of the next version
//!
//! A full refresh is forced once the base file is older than
//! `refresh_after`, so entries that never show up in a delta (removed
//! vehicles) eventually disappear.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub enum DeltaPlan {
    /// Fetch everything and replace the baseline.
    Full,
    /// Fetch only entries newer than `since` and merge them over `cached`.
    Incremental { cached: Value, since: Value },
}

impl DeltaPlan {
    /// Version to request changes since, rendered as a query value.
    pub fn since(&self) -> Option<String> {
        match self {
            DeltaPlan::Full => None,
            DeltaPlan::Incremental { since, .. } => Some(match since {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeltaCache {
    dir: PathBuf,
    name: String,
    refresh_after: Duration,
    key_field: String,
    list_field: String,
    version_field: String,
}

impl DeltaCache {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            refresh_after: DEFAULT_REFRESH_AFTER,
            key_field: "id".to_string(),
            list_field: "items".to_string(),
            version_field: "version".to_string(),
        }
    }

    #[cfg(test)]
    fn refresh_after(mut self, refresh_after: Duration) -> Self {
        self.refresh_after = refresh_after;
        self
    }

    pub fn key_field(mut self, field: &str) -> Self {
        self.key_field = field.to_string();
        self
    }

    pub fn list_field(mut self, field: &str) -> Self {
        self.list_field = field.to_string();
        self
    }

    pub fn version_field(mut self, field: &str) -> Self {
        self.version_field = field.to_string();
        self
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{suffix}.json", self.name))
    }

    pub fn base_path(&self) -> PathBuf {
        self.path("base")
    }

    pub fn delta_path(&self) -> PathBuf {
        self.path("delta")
    }

    pub fn latest_path(&self) -> PathBuf {
        self.path("latest")
    }

    fn is_fresh(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age < self.refresh_after)
    }

    /// Decides whether the next fetch can be incremental.
    pub fn plan(&self) -> DeltaPlan {
        if !self.is_fresh(&self.base_path()) {
            debug!(cache = %self.name, "Base snapshot missing or stale, full refresh");
            return DeltaPlan::Full;
        }

        let latest_path = self.latest_path();
        let cached: Value = match fs::read_to_string(&latest_path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
        {
            Ok(cached) => cached,
            Err(e) => {
                warn!(path = %latest_path.display(), error = %e, "Unreadable merged snapshot, full refresh");
                return DeltaPlan::Full;
            }
        };

        match cached.get(&self.version_field).cloned() {
            Some(since) if !since.is_null() => DeltaPlan::Incremental { cached, since },
            _ => {
                warn!(cache = %self.name, field = %self.version_field, "Merged snapshot has no version, full refresh");
                DeltaPlan::Full
            }
        }
    }

    /// Persists `response` and returns the merged document.
    pub fn commit(&self, plan: DeltaPlan, response: Value) -> Result<Value> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))?;

        write_json(&self.delta_path(), &response)?;

        let merged = match plan {
            DeltaPlan::Full => {
                write_json(&self.base_path(), &response)?;
                self.merge_by_key(None, &response)
            }
            DeltaPlan::Incremental { cached, .. } => self.merge_by_key(Some(&cached), &response),
        };

        write_json(&self.latest_path(), &merged)?;
        let entries = merged
            .get(&self.list_field)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        info!(cache = %self.name, entries, "Cache updated");
        Ok(merged)
    }

    /// Merges the entries of `delta` over those of `cached` by key.
    ///
    /// Cached entries keep their position, entries new in `delta` are
    /// appended, and on conflict the delta entry wins. All other fields of
    /// the result come from `delta`.
    pub fn merge_by_key(&self, cached: Option<&Value>, delta: &Value) -> Value {
        let mut entries: Vec<Value> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        let cached_entries = cached.map(|c| self.entries(c)).unwrap_or_default();
        for entry in cached_entries.into_iter().chain(self.entries(delta)) {
            let Some(key) = key_of(entry, &self.key_field) else {
                warn!(cache = %self.name, field = %self.key_field, "Skipping entry without key");
                continue;
            };
            match positions.entry(key) {
                Entry::Occupied(slot) => entries[*slot.get()] = entry.clone(),
                Entry::Vacant(slot) => {
                    slot.insert(entries.len());
                    entries.push(entry.clone());
                }
            }
        }

        let mut merged = match delta {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        merged.insert(self.list_field.clone(), Value::Array(entries));
        Value::Object(merged)
    }

    fn entries<'a>(&self, document: &'a Value) -> Vec<&'a Value> {
        document
            .get(&self.list_field)
            .and_then(Value::as_array)
            .map(|list| list.iter().collect())
            .unwrap_or_default()
    }
}

fn key_of(entry: &Value, field: &str) -> Option<String> {
    match entry.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    fs::write(path, serde_json::to_vec(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn vehicles_cache(dir: &Path) -> DeltaCache {
        DeltaCache::new(dir, "vehicles_stuttgart")
            .key_field("vin")
            .list_field("vehicles")
            .version_field("maxGlobalVersion")
    }

    fn vins(document: &Value) -> Vec<&str> {
        document["vehicles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["vin"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_empty_cache_plans_full_refresh() {
        let dir = TempDir::new().unwrap();
        assert_eq!(vehicles_cache(dir.path()).plan(), DeltaPlan::Full);
        assert_eq!(DeltaPlan::Full.since(), None);
    }

    #[test]
    fn test_full_then_incremental() {
        let dir = TempDir::new().unwrap();
        let cache = vehicles_cache(dir.path());

        let full = json!({
            "maxGlobalVersion": 10,
            "locationId": 1,
            "vehicles": [{"vin": "A", "fuelLevel": 80}, {"vin": "B", "fuelLevel": 60}],
        });
        cache.commit(DeltaPlan::Full, full).unwrap();
        assert!(cache.base_path().is_file());
        assert!(cache.delta_path().is_file());
        assert!(cache.latest_path().is_file());

        let plan = cache.plan();
        assert_eq!(plan.since().as_deref(), Some("10"));

        let delta = json!({
            "maxGlobalVersion": 12,
            "locationId": 1,
            "vehicles": [{"vin": "B", "fuelLevel": 20}, {"vin": "C", "fuelLevel": 100}],
        });
        let merged = cache.commit(plan, delta.clone()).unwrap();

        assert_eq!(vins(&merged), vec!["A", "B", "C"]);
        assert_eq!(merged["vehicles"][1]["fuelLevel"], json!(20));
        assert_eq!(merged["maxGlobalVersion"], json!(12));

        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(cache.latest_path()).unwrap()).unwrap();
        assert_eq!(on_disk, merged);
        let last_delta: Value =
            serde_json::from_str(&fs::read_to_string(cache.delta_path()).unwrap()).unwrap();
        assert_eq!(last_delta, delta);
    }

    #[test]
    fn test_incremental_commit_keeps_base_untouched() {
        let dir = TempDir::new().unwrap();
        let cache = vehicles_cache(dir.path());
        cache
            .commit(DeltaPlan::Full, json!({"maxGlobalVersion": 1, "vehicles": [{"vin": "A"}]}))
            .unwrap();
        let base_before = fs::read_to_string(cache.base_path()).unwrap();

        let plan = cache.plan();
        cache
            .commit(plan, json!({"maxGlobalVersion": 2, "vehicles": [{"vin": "B"}]}))
            .unwrap();

        assert_eq!(fs::read_to_string(cache.base_path()).unwrap(), base_before);
    }

    #[test]
    fn test_stale_base_forces_full_refresh() {
        let dir = TempDir::new().unwrap();
        let cache = vehicles_cache(dir.path()).refresh_after(Duration::ZERO);
        cache
            .commit(DeltaPlan::Full, json!({"maxGlobalVersion": 1, "vehicles": []}))
            .unwrap();

        assert_eq!(cache.plan(), DeltaPlan::Full);
    }

    #[test]
    fn test_corrupt_latest_forces_full_refresh() {
        let dir = TempDir::new().unwrap();
        let cache = vehicles_cache(dir.path());
        cache
            .commit(DeltaPlan::Full, json!({"maxGlobalVersion": 1, "vehicles": []}))
            .unwrap();
        fs::write(cache.latest_path(), "{truncated").unwrap();

        assert_eq!(cache.plan(), DeltaPlan::Full);
    }

    #[test]
    fn test_merge_skips_entries_without_key() {
        let dir = TempDir::new().unwrap();
        let cache = vehicles_cache(dir.path());
        let merged = cache.merge_by_key(
            Some(&json!({"vehicles": [{"vin": "A"}, {"plate": "X"}]})),
            &json!({"maxGlobalVersion": 3, "vehicles": [{"vin": "A", "new": true}]}),
        );

        assert_eq!(merged["vehicles"], json!([{"vin": "A", "new": true}]));
    }
}
