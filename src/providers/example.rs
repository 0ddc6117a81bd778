//! Synthetic free-floating scooter fleet, useful for trying out a deployment
//! without upstream credentials.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::Provider;
use crate::config::FeedConfig;
use crate::model::{EntityMap, Fleet, record};

const FLEET_SIZE: usize = 9;
const VEHICLE_TYPE_ID: &str = "scooter";

pub struct ExampleProvider {
    config: FeedConfig,
}

pub fn build(config: FeedConfig) -> Result<Box<dyn Provider>> {
    Ok(Box::new(ExampleProvider { config }))
}

#[async_trait]
impl Provider for ExampleProvider {
    fn feed_config(&self) -> &FeedConfig {
        &self.config
    }

    async fn load_stations_and_vehicles(&mut self, _default_last_reported: i64) -> Result<Fleet> {
        let mut vehicle_types = EntityMap::new();
        vehicle_types.insert(
            VEHICLE_TYPE_ID.to_string(),
            record(json!({
                "vehicle_type_id": VEHICLE_TYPE_ID,
                "form_factor": "scooter",
                "propulsion_type": "electric",
                "max_range_meters": 10000,
                "name": "Scooter",
                "wheel_count": 2,
                "return_constraint": "free_floating",
                "default_pricing_plan_id": "basic",
            })),
        );

        let vehicles = (1..=FLEET_SIZE)
            .map(|i| {
                let vehicle_id = format!("vehicle_{i}");
                let vehicle = record(json!({
                    "bike_id": vehicle_id,
                    "vehicle_type_id": VEHICLE_TYPE_ID,
                    "is_reserved": false,
                    "is_disabled": false,
                    "current_range_meters": 10000,
                    "lat": 49.0,
                    "lon": 9.0,
                }));
                (vehicle_id, vehicle)
            })
            .collect();

        Ok(Fleet {
            vehicle_types: Some(vehicle_types),
            vehicles: Some(vehicles),
            ..Fleet::default()
        })
    }
}
