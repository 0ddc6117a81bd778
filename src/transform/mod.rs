//! Turns adapter output into serialization-ready feed content.
//!
//! Steps, in order: default `last_reported`, availability derivation,
//! coordinate rounding, and (for 3.0 feeds) schema migration.

pub mod availability;
pub mod migrate;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::model::{EntityMap, FeedContent, Fleet, RawFeed, into_list};
use crate::schema::SchemaVersion;

pub use availability::derive_availability;
pub use migrate::{MigrationError, migrate_to_v3};

/// Decimal digits kept for latitude/longitude (~0.1 m).
pub const COORDINATE_PRECISION: i32 = 6;

pub struct FeedTransformer {
    target: SchemaVersion,
}

impl FeedTransformer {
    pub fn new(target: SchemaVersion) -> Self {
        Self { target }
    }

    /// Derives availability, rounds coordinates and migrates to the target
    /// schema version.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] when migrating to 3.0 and system
    /// information lacks a required field.
    #[tracing::instrument(skip_all, fields(target = %self.target))]
    pub fn transform(&self, raw: RawFeed) -> Result<FeedContent> {
        let Fleet {
            mut station_information,
            station_status,
            vehicle_types,
            vehicles,
        } = raw.fleet;

        let mut station_status =
            station_status.map(|s| with_default_last_reported(s, raw.last_reported));
        let mut vehicles = vehicles.map(|v| with_default_last_reported(v, raw.last_reported));

        if let (Some(status), Some(vehicles)) = (&station_status, &vehicles) {
            station_status = Some(derive_availability(status, vehicles));
        }

        if let Some(stations) = station_information.as_mut() {
            round_coordinates(stations);
        }
        if let Some(vehicles) = vehicles.as_mut() {
            round_coordinates(vehicles);
        }

        let content = FeedContent {
            system_information: raw.system_information,
            station_information: into_list(station_information),
            station_status: into_list(station_status),
            vehicle_types: into_list(vehicle_types),
            vehicles: into_list(vehicles),
            geofencing_zones: raw.geofencing_zones,
            pricing_plans: raw.pricing_plans,
            alerts: raw.alerts,
        };

        match self.target {
            SchemaVersion::V2_3 => Ok(content),
            SchemaVersion::V3_0 => {
                debug!("Migrating feed content to 3.0");
                Ok(migrate_to_v3(content)?)
            }
        }
    }
}

/// Rounds to [`COORDINATE_PRECISION`] decimal digits. Idempotent.
pub fn round_coordinate(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_PRECISION);
    (value * factor).round() / factor
}

fn round_coordinates(entities: &mut EntityMap) {
    for entity in entities.values_mut() {
        for key in ["lat", "lon"] {
            let Some(value) = entity.get(key).and_then(Value::as_f64) else {
                continue;
            };
            let rounded = round_coordinate(value);
            if rounded.is_finite() {
                entity.insert(key.to_string(), Value::from(rounded));
            }
        }
    }
}

fn with_default_last_reported(mut entities: EntityMap, last_reported: i64) -> EntityMap {
    for entity in entities.values_mut() {
        entity
            .entry("last_reported")
            .or_insert_with(|| Value::from(last_reported));
    }
    entities
}
