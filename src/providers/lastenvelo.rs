//! LastenVelo Freiburg: free cargo bikes published as a single CSV.
//!
//! Every bike sits at its own pick-up location, so each row yields one
//! station, one station status and one vehicle.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::Provider;
use crate::config::FeedConfig;
use crate::fetch::auth::StaticHeader;
use crate::fetch::{BasicClient, HttpClient, RetryPolicy, retry};
use crate::model::{EntityMap, Fleet, Record, record};
use crate::schema::iso_timestamp;

const USAGE_URL: &str = "https://www.lastenvelofreiburg.de/LVF_usage.csv";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const DEFAULT_MAX_RANGE_METERS: u32 = 60_000;
const DEFAULT_CURRENT_RANGE_METERS: u32 = 30_000;

#[derive(Debug, Deserialize)]
struct UsageRow {
    #[serde(rename = "BikeID")]
    bike_id: String,
    #[serde(rename = "UTC Timestamp")]
    timestamp: f64,
    #[serde(rename = "lattitude of station")]
    lat: f64,
    #[serde(rename = "longitude of station")]
    lon: f64,
    #[serde(rename = "rental state (available, rented or defect)")]
    rental_state: String,
    #[serde(rename = "link to booking calender")]
    booking_url: String,
    #[serde(rename = "name of bike")]
    name: String,
    #[serde(rename = "further information")]
    further_information: String,
    #[serde(rename = "latest time bike needs to be returned")]
    available_until: Option<f64>,
}

impl UsageRow {
    fn station_id(&self) -> String {
        format!("{:.6}_{:.6}", self.lat, self.lon).replace('.', "-")
    }

    fn vehicle_type_id(&self) -> Result<String> {
        let info = &self.further_information;
        let wheels = if info.contains("2-rädrig") {
            "two_wheeled"
        } else if info.contains("3-rädrig") || info.contains("Fahrrad mit Anhänger") {
            "three_wheeled"
        } else {
            bail!("Unexpected wheel type {info:?} for bike {}", self.bike_id);
        };

        let kind = if info.contains("Nur Kindertransport") {
            "bike_for_child_only"
        } else if info.contains("Kindertransport möglich") {
            "bike_for_load_and_child"
        } else if info.contains("Fahrrad mit Anhänger") {
            "trailer"
        } else {
            "bike_for_load_only"
        };

        Ok(format!("{wheels}_{kind}"))
    }
}

fn vehicle_type_name(vehicle_type_id: &str) -> Option<&'static str> {
    Some(match vehicle_type_id {
        "three_wheeled_bike_for_load_and_child" => "Lastenrad, 3-rädrig - Kindertransport möglich",
        "three_wheeled_bike_for_load_only" => "Lastenrad, 3-rädrig - Kein Kindertransport",
        "three_wheeled_trailer" => "Fahrrad mit Anhänger - Kein Kindertransport",
        "two_wheeled_bike_for_child_only" => "Lastenrad, 2-rädrig - Nur Kindertransport",
        "two_wheeled_bike_for_load_and_child" => "Lastenrad, 2-rädrig - Kindertransport möglich",
        "two_wheeled_bike_for_load_only" => "Lastenrad, 2-rädrig - Kein Kindertransport",
        _ => return None,
    })
}

pub struct LastenveloProvider<C> {
    config: FeedConfig,
    client: C,
    policy: RetryPolicy,
    url: String,
}

pub fn build(config: FeedConfig) -> Result<Box<dyn Provider>> {
    let client = StaticHeader::new(BasicClient::new()?, "User-Agent", USER_AGENT)?;
    Ok(Box::new(LastenveloProvider::new(
        config,
        client,
        RetryPolicy::default(),
        USAGE_URL,
    )))
}

impl<C: HttpClient> LastenveloProvider<C> {
    pub fn new(config: FeedConfig, client: C, policy: RetryPolicy, url: &str) -> Self {
        Self {
            config,
            client,
            policy,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient + 'static> Provider for LastenveloProvider<C> {
    fn feed_config(&self) -> &FeedConfig {
        &self.config
    }

    async fn load_stations_and_vehicles(&mut self, _default_last_reported: i64) -> Result<Fleet> {
        let csv = retry::get_text(&self.client, &self.policy, &self.url).await?;
        parse_usage_csv(&csv)
    }
}

/// Maps the usage CSV into stations, station status, vehicle types and vehicles.
pub fn parse_usage_csv(csv: &str) -> Result<Fleet> {
    let mut station_information = EntityMap::new();
    let mut station_status = EntityMap::new();
    let mut vehicle_types = EntityMap::new();
    let mut vehicles = EntityMap::new();

    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    for (line, result) in reader.deserialize().enumerate() {
        let row: UsageRow = result.with_context(|| format!("Invalid usage row {}", line + 1))?;
        let last_reported = row.timestamp as i64;
        let station_id = row.station_id();
        let vehicle_type = extract_vehicle_type(&row)?;
        let vehicle_type_id = row.vehicle_type_id()?;

        let mut vehicle = record(json!({
            "bike_id": row.bike_id,
            "vehicle_type_id": vehicle_type_id,
            "station_id": station_id,
            "is_reserved": row.rental_state.contains("rented"),
            "is_disabled": row.rental_state.contains("defect"),
            "current_range_meters": DEFAULT_CURRENT_RANGE_METERS,
            "rental_uris": {"web": row.booking_url},
            "last_reported": last_reported,
        }));
        if let Some(until) = row.available_until {
            vehicle.insert("available_until".to_string(), json!(iso_timestamp(until as i64)));
        }

        station_information.insert(
            station_id.clone(),
            record(json!({
                "station_id": station_id,
                "home_station_id": station_id,
                "name": row.name,
                "lat": row.lat,
                "lon": row.lon,
                "rental_methods": ["key"],
                "is_charging_station": !row.further_information.contains("ohne Ladestation"),
                "rental_uris": {"web": row.booking_url},
            })),
        );
        station_status.insert(
            station_id.clone(),
            record(json!({
                "station_id": station_id,
                "num_bikes_available": 0,
                "vehicle_types_available": [],
                "is_renting": true,
                "is_installed": true,
                "is_returning": true,
                "last_reported": last_reported,
            })),
        );
        vehicle_types.insert(vehicle_type_id, vehicle_type);
        vehicles.insert(row.bike_id, vehicle);
    }

    Ok(Fleet {
        station_information: Some(station_information),
        station_status: Some(station_status),
        vehicle_types: Some(vehicle_types),
        vehicles: Some(vehicles),
    })
}

fn extract_vehicle_type(row: &UsageRow) -> Result<Record> {
    let info = &row.further_information;
    let vehicle_type_id = row.vehicle_type_id()?;
    let name = vehicle_type_name(&vehicle_type_id)
        .ok_or_else(|| anyhow!("No name for vehicle type {vehicle_type_id}"))?;
    let has_engine = info.contains("mit Motor");

    let mut vehicle_type = record(json!({
        "vehicle_type_id": vehicle_type_id,
        "form_factor": "cargo_bicycle",
        "propulsion_type": if has_engine { "electric_assist" } else { "human" },
        "name": name,
        "return_type": "roundtrip",
        "default_pricing_plan_id": "kostenfrei",
        "wheel_count": if info.contains("3-rädrig") || info.contains("hänger") { 3 } else { 2 },
        "rider_capacity": if info.contains("Kindertransport") { 2 } else { 1 },
    }));
    if has_engine {
        vehicle_type.insert("max_range_meters".to_string(), json!(DEFAULT_MAX_RANGE_METERS));
    }
    Ok(vehicle_type)
}
