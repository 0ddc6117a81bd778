use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::model::Record;
use crate::schema::SchemaVersion;

pub const DEFAULT_TTL: u32 = 60;

/// Per-feed configuration, stored as `{config_dir}/{provider}.json`:
///
/// ```json
/// {
///   "feed_data": {
///     "system_information": { "system_id": "example", "language": "en", "name": "Example" },
///     "pricing_plans": [ { "plan_id": "basic", "price": 0 } ]
///   },
///   "provider_data": { "location_alias": "stuttgart" },
///   "generator": { "ttl": 60, "gbfsVersion": "3.0", "useCustomBaseUrl": false }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub feed_data: FeedData,
    /// Adapter-specific parameters.
    #[serde(default)]
    pub provider_data: Record,
    #[serde(default)]
    pub generator: GeneratorSettings,
    /// Deprecated, use `generator.ttl`.
    #[serde(default)]
    ttl: Option<u32>,
    /// Deprecated, use `generator.useCustomBaseUrl`.
    #[serde(default, rename = "useCustomBaseUrl")]
    use_custom_base_url: Option<bool>,
}

/// Static feed content maintained by hand.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedData {
    pub system_information: Record,
    #[serde(default)]
    pub pricing_plans: Option<Vec<Record>>,
    #[serde(default)]
    pub alerts: Option<Vec<Record>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSettings {
    pub ttl: Option<u32>,
    /// Publish under `--custom-base-url` instead of `--base-url`.
    pub use_custom_base_url: Option<bool>,
    #[serde(default)]
    pub gbfs_version: SchemaVersion,
    /// Adapter to use when it cannot be derived from the feed name.
    pub provider: Option<String>,
}

impl FeedConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feed config {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Invalid feed config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        for (key, set) in [
            ("ttl", config.ttl.is_some()),
            ("useCustomBaseUrl", config.use_custom_base_url.is_some()),
        ] {
            if set {
                warn!(key, "Top-level generator keys are deprecated, move them into the `generator` section");
            }
        }
        Ok(config)
    }

    pub fn ttl(&self) -> u32 {
        self.ttl.or(self.generator.ttl).unwrap_or(DEFAULT_TTL)
    }

    pub fn use_custom_base_url(&self) -> bool {
        self.use_custom_base_url
            .or(self.generator.use_custom_base_url)
            .unwrap_or(false)
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.generator.gbfs_version
    }

    /// Reads a required string parameter from `provider_data`.
    pub fn provider_str(&self, key: &str) -> Result<&str> {
        self.provider_data
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("provider_data.{key} is missing or not a string"))
    }

    /// Ids of all pricing plans defined in `feed_data`.
    pub fn pricing_plan_ids(&self) -> Vec<&str> {
        self.feed_data
            .pricing_plans
            .iter()
            .flatten()
            .filter_map(|plan| plan.get("plan_id").and_then(|v| v.as_str()))
            .collect()
    }
}

/// Reads a required environment variable.
pub fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Environment variable {name} is not set"))
}
