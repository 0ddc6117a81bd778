//! Fleetster-based station carsharing (deer).
//!
//! Locations become stations, vehicles are parked at their location.
//! Fleetster categories are mapped to pricing plan categories; every plan
//! defined in the feed config whose id starts with that category applies.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use super::Provider;
use crate::config::{FeedConfig, env_var};
use crate::fetch::{BasicClient, HttpClient, LoginSpec, RetryPolicy, TokenScheme, TokenSession};
use crate::model::{EntityMap, Fleet, Record, record};

const DEER_CATEGORIES: &[(&str, &str)] = &[
    ("compact", "basic_line"),
    ("midsize", "basic_line"),
    ("city", "basic_line"),
    ("fullsize", "basic_line"),
    ("premium", "basic_line"),
    ("economy", "basic_line"),
];

/// `provider_data` key naming the plan category for unmapped categories.
const FALLBACK_CATEGORY_KEY: &str = "fallback_pricing_plan_category";

pub struct FleetsterApi<C> {
    session: TokenSession<C>,
    api_url: String,
}

impl<C: HttpClient> FleetsterApi<C> {
    pub fn new(client: C, api_url: &str, user: &str, password: &str, policy: RetryPolicy) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        let login = LoginSpec {
            url: format!("{api_url}/users/auth"),
            body: json!({"email": user, "password": password}),
            token_field: "_id".to_string(),
            scheme: TokenScheme::Raw,
        };
        Self {
            session: TokenSession::new(client, login, policy),
            api_url,
        }
    }

    async fn list(&mut self, resource: &str) -> Result<Vec<Value>> {
        let url = format!("{}/{resource}", self.api_url);
        match self.session.get_json(&url, &[]).await? {
            Value::Array(items) => Ok(items),
            other => bail!("Expected a list from {url}, got {}", type_name(&other)),
        }
    }

    pub async fn locations(&mut self) -> Result<Vec<Value>> {
        self.list("locations").await
    }

    pub async fn vehicles(&mut self) -> Result<Vec<Value>> {
        self.list("vehicles").await
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

pub struct FleetsterProvider<C> {
    config: FeedConfig,
    api: FleetsterApi<C>,
    categories: &'static [(&'static str, &'static str)],
    return_constraint: &'static str,
}

pub fn build_deer(config: FeedConfig) -> Result<Box<dyn Provider>> {
    let api = FleetsterApi::new(
        BasicClient::new()?,
        &env_var("DEER_API_URL")?,
        &env_var("DEER_USER")?,
        &env_var("DEER_PASSWORD")?,
        RetryPolicy::default(),
    );
    Ok(Box::new(FleetsterProvider::deer(config, api)))
}

impl<C: HttpClient> FleetsterProvider<C> {
    pub fn deer(config: FeedConfig, api: FleetsterApi<C>) -> Self {
        Self {
            config,
            api,
            categories: DEER_CATEGORIES,
            return_constraint: "any_station",
        }
    }

    fn plan_category(&self, category: &str) -> Result<&str> {
        if let Some((_, plan_category)) = self.categories.iter().find(|(c, _)| *c == category) {
            return Ok(*plan_category);
        }
        self.config
            .provider_data
            .get(FALLBACK_CATEGORY_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                anyhow!("No pricing plan category for vehicle category {category:?} and no {FALLBACK_CATEGORY_KEY} configured")
            })
    }

    /// Default plan and all plans for a vehicle category.
    fn pricing_plans(&self, category: &str) -> Result<(String, Vec<String>)> {
        let plan_category = self.plan_category(category)?;
        let plan_ids: Vec<String> = self
            .config
            .pricing_plan_ids()
            .into_iter()
            .filter(|id| id.starts_with(plan_category))
            .map(str::to_string)
            .collect();
        match plan_ids.first() {
            Some(default) => Ok((default.clone(), plan_ids)),
            None => bail!("No pricing plan defined for category {plan_category}"),
        }
    }

    fn extract_vehicle_type(&self, vehicle: &Value) -> Result<Record> {
        let brand = str_of(vehicle, "brandName").unwrap_or_default();
        let model = str_of(vehicle, "model").unwrap_or_default();
        let category = str_of(vehicle, "category").unwrap_or_default();
        let electric = str_of(vehicle, "fuelType") == Some("electric");
        let (default_plan, plan_ids) = self.pricing_plans(category)?;

        let mut vehicle_type = record(json!({
            "vehicle_type_id": vehicle_type_id(brand, model),
            "form_factor": "car",
            "propulsion_type": if electric { "electric" } else { "combustion" },
            "name": format!("{brand} {model}").trim(),
            "make": brand,
            "model": model,
            "wheel_count": 4,
            "return_constraint": self.return_constraint,
            "default_pricing_plan_id": default_plan,
            "pricing_plan_ids": plan_ids,
        }));
        if let Some(seats) = vehicle.get("numberOfSeats").and_then(Value::as_u64) {
            vehicle_type.insert("rider_capacity".to_string(), json!(seats));
        }
        if let Some(range) = vehicle.get("range").and_then(Value::as_f64) {
            vehicle_type.insert("max_range_meters".to_string(), json!(range * 1000.0));
        }
        Ok(vehicle_type)
    }
}

fn str_of<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn vehicle_type_id(brand: &str, model: &str) -> String {
    format!("{brand}_{model}")
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Vehicles of one model share a type; fields a later vehicle adds fill
/// gaps without overwriting what an earlier vehicle supplied.
fn merge_vehicle_type(vehicle_types: &mut EntityMap, id: &str, vehicle_type: Record) {
    let known = vehicle_types.entry(id.to_string()).or_default();
    for (field, value) in vehicle_type {
        known.entry(field).or_insert(value);
    }
}

fn extract_station(location: &Value, last_reported: i64) -> Option<(String, Record, Record)> {
    let station_id = str_of(location, "_id")?.to_string();
    let lat = location.get("latitude").and_then(Value::as_f64)?;
    let lon = location.get("longitude").and_then(Value::as_f64)?;

    let mut info = record(json!({
        "station_id": station_id,
        "name": str_of(location, "name").unwrap_or(&station_id),
        "lat": lat,
        "lon": lon,
        "rental_methods": ["key"],
    }));
    if let Some(address) = location.get("address") {
        let street = str_of(address, "street").unwrap_or_default();
        let number = str_of(address, "streetNumber").unwrap_or_default();
        let line = format!("{street} {number}").trim().to_string();
        if !line.is_empty() {
            info.insert("address".to_string(), json!(line));
        }
        if let Some(post_code) = str_of(address, "postcode") {
            info.insert("post_code".to_string(), json!(post_code));
        }
        if let Some(city) = str_of(address, "city") {
            info.insert("city".to_string(), json!(city));
        }
    }

    let status = record(json!({
        "station_id": station_id,
        "num_bikes_available": 0,
        "vehicle_types_available": [],
        "is_renting": true,
        "is_installed": true,
        "is_returning": true,
        "last_reported": last_reported,
    }));

    Some((station_id, info, status))
}

#[async_trait]
impl<C: HttpClient + 'static> Provider for FleetsterProvider<C> {
    fn feed_config(&self) -> &FeedConfig {
        &self.config
    }

    async fn load_stations_and_vehicles(&mut self, default_last_reported: i64) -> Result<Fleet> {
        let mut station_information = EntityMap::new();
        let mut station_status = EntityMap::new();
        for location in self.api.locations().await? {
            match extract_station(&location, default_last_reported) {
                Some((id, info, status)) => {
                    station_information.insert(id.clone(), info);
                    station_status.insert(id, status);
                }
                None => warn!(location = %location, "Skipping location without id or coordinates"),
            }
        }

        let mut vehicle_types = EntityMap::new();
        let mut vehicles = EntityMap::new();
        for vehicle in self.api.vehicles().await? {
            let Some(vehicle_id) = str_of(&vehicle, "_id") else {
                warn!("Skipping vehicle without id");
                continue;
            };
            let vehicle_type = self.extract_vehicle_type(&vehicle)?;
            let vehicle_type_id = vehicle_type["vehicle_type_id"].clone();

            let mut gbfs_vehicle = record(json!({
                "bike_id": vehicle_id,
                "vehicle_type_id": vehicle_type_id,
                "is_reserved": false,
                "is_disabled": !vehicle.get("active").and_then(Value::as_bool).unwrap_or(true),
            }));
            if let Some(location_id) = str_of(&vehicle, "locationId") {
                gbfs_vehicle.insert("station_id".to_string(), json!(location_id));
            }

            if let Some(id) = vehicle_type_id.as_str() {
                merge_vehicle_type(&mut vehicle_types, id, vehicle_type);
            }
            vehicles.insert(vehicle_id.to_string(), gbfs_vehicle);
        }

        Ok(Fleet {
            station_information: Some(station_information),
            station_status: Some(station_status),
            vehicle_types: Some(vehicle_types),
            vehicles: Some(vehicles),
        })
    }
}
