//! Generation of one feed: config, adapter, orphan filter, transformer, writer.

use anyhow::{Result, bail};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::model::{Fleet, RawFeed};
use crate::providers::build_provider;
use crate::transform::FeedTransformer;
use crate::writer::FeedWriter;

/// Settings shared by every feed of one invocation.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub config_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Public base URL, the feed id is appended.
    pub base_url: String,
    /// Base URL for feeds that declare `useCustomBaseUrl`.
    pub custom_base_url: Option<String>,
}

/// Generates the feed for `provider_id` into `{output_dir}/{provider_id}`
/// and returns the names of the feeds written.
#[tracing::instrument(skip_all, fields(provider = %provider_id))]
pub async fn generate_feed_for(provider_id: &str, settings: &RunSettings) -> Result<Vec<String>> {
    let config = FeedConfig::load(&settings.config_dir.join(format!("{provider_id}.json")))?;
    let base_url = feed_base_url(provider_id, &config, settings)?;
    let version = config.schema_version();
    let ttl = config.ttl();

    let mut provider = build_provider(provider_id, config)?;
    let last_reported = Utc::now().timestamp();

    let mut fleet = provider.load_stations_and_vehicles(last_reported).await?;
    detach_orphaned_vehicles(&mut fleet);
    let geofencing_zones = provider.load_geofencing_zones().await?;

    let raw = RawFeed {
        system_information: provider.load_system_information(),
        fleet,
        pricing_plans: provider.load_pricing_plans(),
        alerts: provider.load_alerts(),
        geofencing_zones,
        last_reported,
    };
    let content = FeedTransformer::new(version).transform(raw)?;

    let feeds = FeedWriter::new(version).write_feed(
        &settings.output_dir.join(provider_id),
        &content,
        &base_url,
        last_reported,
        ttl,
    )?;
    info!(%version, feeds = feeds.len(), "Updated feeds");
    Ok(feeds)
}

fn feed_base_url(provider_id: &str, config: &FeedConfig, settings: &RunSettings) -> Result<String> {
    if !config.use_custom_base_url() {
        return Ok(format!("{}/{provider_id}", settings.base_url));
    }
    match &settings.custom_base_url {
        Some(custom) => Ok(format!("{custom}/{provider_id}")),
        None => bail!("Config {provider_id} declares useCustomBaseUrl, but no custom base URL was given"),
    }
}

/// Removes `station_id` from vehicles referencing an unknown station, so
/// they are published as free-floating.
pub fn detach_orphaned_vehicles(fleet: &mut Fleet) {
    let Some(vehicles) = fleet.vehicles.as_mut() else {
        return;
    };
    let known: BTreeSet<&str> = fleet
        .station_information
        .iter()
        .flat_map(|stations| stations.keys().map(String::as_str))
        .collect();

    for (vehicle_id, vehicle) in vehicles.iter_mut() {
        let orphaned = match vehicle.get("station_id").and_then(|v| v.as_str()) {
            Some(station_id) => !known.contains(station_id),
            None => false,
        };
        if orphaned {
            if let Some(station_id) = vehicle.remove("station_id") {
                warn!(vehicle_id = %vehicle_id, station_id = %station_id, "Vehicle references unknown station, detaching");
            }
        }
    }
}
