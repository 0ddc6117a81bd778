//! Free2move free-floating carsharing.
//!
//! Vehicles come from a rate-limited, token-protected endpoint that also
//! serves deltas since a global version, so they go through a [`DeltaCache`].
//! Parking spots and charging stations are published as GeoJSON and become
//! stations; the operating area becomes a geofencing zone.
//!
//! Vehicle ids are persistent VINs and appear in rental URIs, so feeds built
//! from this adapter should not be published openly.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::{info, warn};

use super::Provider;
use crate::config::{FeedConfig, env_var};
use crate::fetch::{
    BasicClient, DeltaCache, HttpClient, LoginSpec, RetryPolicy, TokenScheme, TokenSession, retry,
};
use crate::model::{EntityMap, Fleet, Record, record};

const DEFAULT_COMBUSTION_MAX_RANGE_METERS: u32 = 400_000;
const DEFAULT_ELECTRIC_MAX_RANGE_METERS: u32 = 200_000;
const DEFAULT_PRICING_PLAN_PREFIX: &str = "standard";
const MAX_COLOR_SUFFIX_LEN: usize = 20;

const RENTAL_URI_TEMPLATES: &[(&str, &str)] = &[
    ("android", "https://www.share-now.com/vehicle/{VIN}?location={locationId}"),
    ("ios", "share-now://vehicle/{VIN}?location={locationId}"),
];

const FUEL_TYPE_PROPULSION: &[(&str, &str)] = &[
    ("ELECTRIC", "electric"),
    ("SUPER_95", "combustion"),
    ("GASOLINE", "combustion"),
    ("DIESEL", "combustion_diesel"),
];

// Deduced from the public price list, check regularly.
const BUILD_SERIES_PRICING_PLAN_PREFIX: &[(&str, &str)] = &[
    ("FIAT_500_BEV", "mini"),
    ("OPEL_ASTRA", "standard"),
    ("OPEL_CORSA", "standard"),
    ("OPEL_CROSSLAND", "standard"),
];

const BUILD_SERIES_MAKE_MODEL: &[(&str, &str, &str)] = &[
    ("A453", "smart", "smart"),
    ("A4539", "smart", "fortwo cabrio electric"),
    ("C453", "smart", "fortwo"),
    ("C4539", "smart", "fortwo electric"),
    ("H243", "Mercedes-Benz", "Mercedes-Benz"),
    ("W177", "Mercedes-Benz", "A 180"),
    ("bmw_1er_f40", "BMW", "118i 5-Türer"),
    ("bmw_2er_active_tourer", "BMW", "BMW Active Tourer"),
    ("bmw_2er_cabrio", "BMW", "BMW Convertible"),
    ("bmw_i3", "BMW", "i3"),
    ("bmw_x1", "BMW", "X1"),
    ("bmw_x2", "BMW", "X2"),
    ("mini_bev", "MINI", "Cooper SE"),
    ("mini_3-tuerer", "MINI", "3-Door"),
    ("mini_5-tuerer", "MINI", "5-Door"),
    ("mini_cabrio", "MINI", "Convertible"),
    ("mini_clubman", "MINI", "Clubman"),
    ("mini_countryman", "MINI", "Countryman"),
    ("FIAT_500", "Fiat", "500"),
    ("FIAT_500_BEV", "Fiat", "500e"),
    ("FIAT_500_X", "Fiat", "500X"),
    ("CITROEN_C3", "Citroen", "C3"),
    ("JEEP_RENEGADE_HYBRID", "JEEP", ""),
    ("PEUGEOT_208", "Peugeot", "208"),
    ("PEUGEOT_208_EV", "Peugeot", "208 EV"),
    ("PEUGEOT_2008", "Peugeot", "2008"),
    ("PEUGEOT_308", "Peugeot", "308"),
    ("PEUGEOT_3008", "Peugeot", "3008"),
    ("RENAULT_ZOE", "Renault", "ZOE"),
    ("OPEL_ASTRA", "Opel", "Astra"),
    ("OPEL_CORSA", "Opel", "Corsa"),
    ("OPEL_CROSSLAND", "Opel", "Crossland"),
];

const COLORS: &[(&str, &str)] = &[
    ("EN3", "weiß"),
    ("650", "weiß"),
    ("EAZ", "weiß"),
    ("EN2", "silber"),
    ("EB2", "silber"),
    ("761", "silber"),
    ("EDA", "silber"),
    ("EAD", "silber"),
    ("191", "schwarz"),
    ("696", "schwarz"),
    ("787", "grau"),
    ("268U", "weiß"),
    ("P0WP", "weiß"),
    ("601U", "schwarz"),
    ("205U", "grau"),
    ("M0V9", "schwarz"),
    ("278U", "blau"),
    ("230U", "grün"),
    ("237U", "rose gold"),
];

fn lookup<'a>(table: &'a [(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

pub struct Free2moveApi<C> {
    session: TokenSession<C>,
    base_url: String,
    cache_dir: PathBuf,
}

impl<C: HttpClient> Free2moveApi<C> {
    pub fn new(
        client: C,
        base_url: &str,
        user: &str,
        password: &str,
        cache_dir: impl Into<PathBuf>,
        policy: RetryPolicy,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let login = LoginSpec {
            url: format!("{base_url}/api/rental/externalapi/login"),
            body: json!({"username": user, "password": password}),
            token_field: "token".to_string(),
            scheme: TokenScheme::Bearer,
        };
        Self {
            session: TokenSession::new(client, login, policy),
            base_url,
            cache_dir: cache_dir.into(),
        }
    }

    fn vehicle_cache(&self, location_alias: &str) -> DeltaCache {
        DeltaCache::new(
            self.cache_dir.join(format!("free2move_{location_alias}")),
            format!("vehicles_{location_alias}"),
        )
        .key_field("vin")
        .list_field("vehicles")
        .version_field("maxGlobalVersion")
    }

    /// All vehicles of a location, merged from the cached baseline and the
    /// latest delta.
    pub async fn all_vehicles(&mut self, location_alias: &str) -> Result<Vec<Value>> {
        let cache = self.vehicle_cache(location_alias);
        let plan = cache.plan();
        let query: Vec<(&str, String)> = plan
            .since()
            .map(|version| vec![("globalVersion", version)])
            .unwrap_or_default();

        let url = format!(
            "{}/api/rental/externalapi/v1/vehicles/{location_alias}",
            self.base_url
        );
        let response = self.session.get_json(&url, &query).await?;
        let merged = cache.commit(plan, response)?;

        match merged.get("vehicles") {
            Some(Value::Array(vehicles)) => Ok(vehicles.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn geodata(&self, location_alias: &str, resource: &str) -> Result<Value> {
        let url = format!(
            "{}/api/geo/geodata/v1/locations/{location_alias}/{resource}",
            self.base_url
        );
        retry::get_json(self.session.client(), self.session.policy(), &url).await
    }

    /// The operating area, a single GeoJSON feature.
    pub async fn operating_area(&self, location_alias: &str) -> Result<Value> {
        self.geodata(location_alias, "operating_area").await
    }

    pub async fn parking_spots(&self, location_alias: &str) -> Result<Vec<Value>> {
        Ok(features(self.geodata(location_alias, "parking_spots").await?))
    }

    pub async fn charging_stations(&self, location_alias: &str) -> Result<Vec<Value>> {
        Ok(features(self.geodata(location_alias, "charging_stations").await?))
    }
}

fn features(collection: Value) -> Vec<Value> {
    match collection {
        Value::Object(mut map) => match map.remove("features") {
            Some(Value::Array(features)) => features,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

pub struct Free2moveProvider<C> {
    config: FeedConfig,
    api: Free2moveApi<C>,
    location_alias: String,
    location_id: String,
}

pub fn build(config: FeedConfig) -> Result<Box<dyn Provider>> {
    let api = Free2moveApi::new(
        BasicClient::new()?,
        &env_var("FREE2MOVE_BASE_URL")?,
        &env_var("FREE2MOVE_USER")?,
        &env_var("FREE2MOVE_PASSWORD")?,
        env_var("CACHE_DIR")?,
        RetryPolicy::default(),
    );
    Ok(Box::new(Free2moveProvider::new(config, api)?))
}

impl<C: HttpClient> Free2moveProvider<C> {
    pub fn new(config: FeedConfig, api: Free2moveApi<C>) -> Result<Self> {
        let location_alias = config.provider_str("location_alias")?.to_string();
        let location_id = match config.provider_data.get("location_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => bail!("provider_data.location_id is missing"),
        };
        Ok(Self {
            config,
            api,
            location_alias,
            location_id,
        })
    }

    fn pricing_plans(&self, build_series: &str) -> (String, Vec<String>) {
        let prefix = lookup(BUILD_SERIES_PRICING_PLAN_PREFIX, build_series).unwrap_or_else(|| {
            warn!(build_series, "No pricing plan prefix, using {DEFAULT_PRICING_PLAN_PREFIX:?}");
            DEFAULT_PRICING_PLAN_PREFIX
        });

        let defined = self.config.pricing_plan_ids();
        let default_plan = format!("{prefix}_minute");
        if !defined.contains(&default_plan.as_str()) {
            warn!(plan_id = %default_plan, "Default pricing plan not defined in config");
        }
        let plan_ids = defined
            .into_iter()
            .filter(|id| id.starts_with(prefix))
            .map(str::to_string)
            .collect();

        (default_plan, plan_ids)
    }

    fn extract_vehicle_type(&self, vehicle: &Value) -> Option<Record> {
        let propulsion = match vehicle.get("fuelType").and_then(Value::as_str) {
            Some(fuel) => lookup(FUEL_TYPE_PROPULSION, fuel)?,
            None => "combustion",
        };
        let max_range_meters = if propulsion == "electric" {
            DEFAULT_ELECTRIC_MAX_RANGE_METERS
        } else {
            DEFAULT_COMBUSTION_MAX_RANGE_METERS
        };

        let build_series = match vehicle.get("buildSeries")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let color = extract_color(vehicle);
        let (make, model) = BUILD_SERIES_MAKE_MODEL
            .iter()
            .find(|(series, _, _)| *series == build_series)
            .map_or(("", ""), |(_, make, model)| (*make, *model));
        let (default_plan, plan_ids) = self.pricing_plans(&build_series);

        let mut vehicle_type = record(json!({
            "vehicle_type_id": normalize_id(&format!("{build_series}_{color}")),
            "form_factor": "car",
            "propulsion_type": propulsion,
            "max_range_meters": max_range_meters,
            "name": format!("{make} {model}").trim(),
            "default_pricing_plan_id": default_plan,
            "pricing_plan_ids": plan_ids,
            "wheel_count": 4,
            "make": make,
            "model": model,
            "return_constraint": "free_floating",
        }));
        if let Some(image) = vehicle.get("imageUrl").and_then(Value::as_str) {
            vehicle_type.insert("vehicle_image".to_string(), json!(image.replace("{density}", "2x")));
        }
        if !color.is_empty() {
            vehicle_type.insert("color".to_string(), json!(color));
        }
        if let Some(seats) = vehicle.get("seats").filter(|s| s.as_u64().is_some_and(|n| n > 0)) {
            vehicle_type.insert("rider_capacity".to_string(), seats.clone());
        }
        Some(vehicle_type)
    }

    fn extract_vehicle(&self, vehicle: &Value, vehicle_type: &Record) -> Option<(String, Record)> {
        let vin = vehicle.get("vin").and_then(Value::as_str)?;
        let fuel_percent = vehicle.get("fuelLevel").and_then(Value::as_f64)? / 100.0;
        let max_range = vehicle_type.get("max_range_meters").and_then(Value::as_f64)?;
        let position = vehicle.get("geoCoordinate");

        let rental_uris: serde_json::Map<String, Value> = RENTAL_URI_TEMPLATES
            .iter()
            .map(|(platform, template)| {
                let uri = template
                    .replace("{VIN}", vin)
                    .replace("{locationId}", &self.location_id);
                (platform.to_string(), json!(uri))
            })
            .collect();

        let mut gbfs_vehicle = record(json!({
            "bike_id": vin,
            "is_reserved": false,
            "is_disabled": false,
            "vehicle_type_id": vehicle_type.get("vehicle_type_id"),
            "current_fuel_percent": fuel_percent,
            "current_range_meters": (max_range * fuel_percent) as i64,
            "lat": position.and_then(|p| p.get("latitude")),
            "lon": position.and_then(|p| p.get("longitude")),
            "rental_uris": rental_uris,
        }));
        if let Some(parking_id) = vehicle
            .get("parkingId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        {
            gbfs_vehicle.insert("station_id".to_string(), json!(parking_id));
        }

        Some((vin.to_string(), gbfs_vehicle))
    }
}

fn extract_color(vehicle: &Value) -> String {
    let primary = vehicle.get("primaryColor").and_then(Value::as_str);
    if let Some(color) = primary.and_then(|c| lookup(COLORS, c)) {
        return color.to_string();
    }
    let Some(image_url) = vehicle.get("imageUrl").and_then(Value::as_str) else {
        info!(primary_color = primary, "No color mapping and no image url");
        return String::new();
    };

    // Image urls end with the color name.
    let suffix = image_url
        .rsplit('_')
        .next()
        .and_then(|s| s.split('.').next())
        .unwrap_or_default();
    let suffix: String = suffix
        .chars()
        .rev()
        .take(MAX_COLOR_SUFFIX_LEN)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    info!(primary_color = primary, color = %suffix, "No color mapping, using image url suffix");
    suffix
}

fn normalize_id(raw: &str) -> String {
    let mut id = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            'ä' | 'Ä' => id.push_str("ae"),
            'ö' | 'Ö' => id.push_str("oe"),
            'ü' | 'Ü' => id.push_str("ue"),
            'ß' => id.push_str("ss"),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => id.push(c),
            _ => id.push('_'),
        }
    }
    id
}

fn extract_station(feature: &Value, last_reported: i64) -> Option<(String, Record, Record)> {
    let station_id = match feature.get("id")? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let center = feature.get("geometry")?.get("coordinates")?.as_array()?;
    let properties = feature.get("properties")?;

    let info = record(json!({
        "station_id": station_id,
        "name": properties.get("name")?,
        "lat": center.get(1)?,
        "lon": center.first()?,
        "capacity": properties.get("capacity")?,
        "is_charging_station": properties.get("type").and_then(Value::as_str) == Some("charging_station"),
        "rental_methods": ["key"],
    }));
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

/// Reverses every ring of a Polygon or MultiPolygon geometry in place.
///
/// The upstream publishes the operating area clockwise; a zone restricting
/// everything outside of it must be counterclockwise.
pub fn reverse_rings(geometry: &mut Value) {
    let multi = match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => false,
        Some("MultiPolygon") => true,
        _ => return,
    };
    let Some(Value::Array(coordinates)) = geometry.get_mut("coordinates") else {
        return;
    };

    if multi {
        for polygon in coordinates {
            if let Value::Array(rings) = polygon {
                rings.iter_mut().for_each(reverse_ring);
            }
        }
    } else {
        coordinates.iter_mut().for_each(reverse_ring);
    }
}

fn reverse_ring(ring: &mut Value) {
    if let Value::Array(points) = ring {
        points.reverse();
    }
}

#[async_trait]
impl<C: HttpClient + 'static> Provider for Free2moveProvider<C> {
    fn feed_config(&self) -> &FeedConfig {
        &self.config
    }

    async fn load_stations_and_vehicles(&mut self, default_last_reported: i64) -> Result<Fleet> {
        let mut station_information = EntityMap::new();
        let mut station_status = EntityMap::new();
        let mut spots = self.api.parking_spots(&self.location_alias).await?;
        spots.extend(self.api.charging_stations(&self.location_alias).await?);
        for feature in &spots {
            match extract_station(feature, default_last_reported) {
                Some((id, info, status)) => {
                    station_information.insert(id.clone(), info);
                    station_status.insert(id, status);
                }
                None => warn!(feature = %feature, "Skipping malformed parking spot"),
            }
        }

        let mut vehicle_types = EntityMap::new();
        let mut vehicles = EntityMap::new();
        for vehicle in self.api.all_vehicles(&self.location_alias).await? {
            if !vehicle.get("freeForRental").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let extracted = self.extract_vehicle_type(&vehicle).and_then(|vehicle_type| {
                let (id, gbfs_vehicle) = self.extract_vehicle(&vehicle, &vehicle_type)?;
                Some((id, gbfs_vehicle, vehicle_type))
            });
            let Some((id, gbfs_vehicle, vehicle_type)) = extracted else {
                warn!(vin = ?vehicle.get("vin"), "Vehicle extraction failed");
                continue;
            };
            if let Some(type_id) = vehicle_type.get("vehicle_type_id").and_then(Value::as_str) {
                vehicle_types.insert(type_id.to_string(), vehicle_type.clone());
            }
            vehicles.insert(id, gbfs_vehicle);
        }

        Ok(Fleet {
            station_information: Some(station_information),
            station_status: Some(station_status),
            vehicle_types: Some(vehicle_types),
            vehicles: Some(vehicles),
        })
    }

    async fn load_geofencing_zones(&mut self) -> Result<Option<Vec<Record>>> {
        let mut area = self.api.operating_area(&self.location_alias).await?;
        if let Some(geometry) = area.get_mut("geometry") {
            reverse_rings(geometry);
        }

        let mut zone = record(area);
        zone.insert(
            "properties".to_string(),
            json!({
                "name": self.location_alias,
                "rules": [{
                    "ride_allowed": false,
                    "ride_through_allowed": true,
                    "station_parking": true,
                }],
            }),
        );
        Ok(Some(vec![zone]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedClient;
    use crate::model::str_field;
    use std::time::Duration;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
        "feed_data": {
            "system_information": {"system_id": "free2move_stuttgart"},
            "pricing_plans": [{"plan_id": "mini_minute"}, {"plan_id": "mini_hour"}, {"plan_id": "standard_minute"}]
        },
        "provider_data": {"location_alias": "stuttgart", "location_id": 3}
    }"#;

    const PARKING_SPOTS: &str = r#"{"type": "FeatureCollection", "features": [
        {"id": "P1", "type": "Feature", "geometry": {"type": "Point", "coordinates": [9.18, 48.78]},
         "properties": {"name": "Marktplatz", "capacity": 4, "type": "parking_spot"}}
    ]}"#;

    const CHARGING_STATIONS: &str = r#"{"type": "FeatureCollection", "features": [
        {"id": "C1", "type": "Feature", "geometry": {"type": "Point", "coordinates": [9.2, 48.8]},
         "properties": {"name": "Laden", "capacity": 2, "type": "charging_station"}},
        {"id": "broken", "type": "Feature", "properties": {}}
    ]}"#;

    const VEHICLES: &str = r#"{"maxGlobalVersion": 5, "locationId": 3, "locationName": "Stuttgart", "vehicles": [
        {"vin": "VIN1", "freeForRental": true, "fuelType": "ELECTRIC", "fuelLevel": 50, "buildSeries": "FIAT_500_BEV",
         "primaryColor": "EN3", "imageUrl": "https://img.example/{density}/fiat_weiss.png", "seats": 4,
         "geoCoordinate": {"latitude": 48.77, "longitude": 9.17}, "parkingId": "P1"},
        {"vin": "VIN2", "freeForRental": false, "fuelType": "DIESEL", "fuelLevel": 80, "buildSeries": "OPEL_ASTRA"},
        {"vin": "VIN3", "freeForRental": true, "fuelType": "SUPER_95", "fuelLevel": 100, "buildSeries": "OPEL_CORSA",
         "primaryColor": "XXX", "imageUrl": "https://img.example/corsa_blau.png",
         "geoCoordinate": {"latitude": 48.7, "longitude": 9.1}, "parkingId": ""}
    ]}"#;

    fn provider(cache: &TempDir, responses: Vec<(u16, &str)>) -> Free2moveProvider<ScriptedClient> {
        let api = Free2moveApi::new(
            ScriptedClient::new(responses),
            "https://f2m.example/",
            "user",
            "secret",
            cache.path(),
            RetryPolicy::new(2, Duration::ZERO),
        );
        Free2moveProvider::new(FeedConfig::from_json(CONFIG).unwrap(), api).unwrap()
    }

    #[tokio::test]
    async fn test_load_stations_and_vehicles() {
        let cache = TempDir::new().unwrap();
        let mut provider = provider(
            &cache,
            vec![
                (200, PARKING_SPOTS),
                (200, CHARGING_STATIONS),
                (200, r#"{"token": "t"}"#),
                (200, VEHICLES),
            ],
        );

        let fleet = provider.load_stations_and_vehicles(100).await.unwrap();

        let stations = fleet.station_information.unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations["P1"]["lat"], json!(48.78));
        assert_eq!(stations["C1"]["is_charging_station"], json!(true));

        let vehicles = fleet.vehicles.unwrap();
        assert_eq!(vehicles.len(), 2);
        let fiat = &vehicles["VIN1"];
        assert_eq!(str_field(fiat, "station_id"), Some("P1"));
        assert_eq!(fiat["current_range_meters"], json!(100_000));
        assert_eq!(
            fiat["rental_uris"]["ios"],
            json!("share-now://vehicle/VIN1?location=3")
        );
        assert!(!vehicles["VIN3"].contains_key("station_id"));

        let types = fleet.vehicle_types.unwrap();
        let fiat_type = &types["FIAT_500_BEV_weiss"];
        assert_eq!(str_field(fiat_type, "name"), Some("Fiat 500e"));
        assert_eq!(str_field(fiat_type, "default_pricing_plan_id"), Some("mini_minute"));
        assert_eq!(fiat_type["pricing_plan_ids"], json!(["mini_minute", "mini_hour"]));
        assert_eq!(
            str_field(fiat_type, "vehicle_image"),
            Some("https://img.example/2x/fiat_weiss.png")
        );
        assert!(types.contains_key("OPEL_CORSA_blau"));

        let seen = provider.api.session.client().requests();
        assert_eq!(
            seen[3].url,
            "https://f2m.example/api/rental/externalapi/v1/vehicles/stuttgart"
        );
        assert_eq!(seen[3].authorization().as_deref(), Some("Bearer t"));
        assert!(seen[0].authorization().is_none());
    }

    #[tokio::test]
    async fn test_second_run_requests_delta() {
        let cache = TempDir::new().unwrap();
        let delta = r#"{"maxGlobalVersion": 6, "locationId": 3, "vehicles": [
            {"vin": "VIN4", "freeForRental": true, "fuelLevel": 10, "buildSeries": "OPEL_ASTRA"}
        ]}"#;
        let mut provider = provider(
            &cache,
            vec![
                (200, r#"{"token": "t"}"#),
                (200, VEHICLES),
                (200, delta),
            ],
        );

        assert_eq!(provider.api.all_vehicles("stuttgart").await.unwrap().len(), 3);
        let merged = provider.api.all_vehicles("stuttgart").await.unwrap();
        assert_eq!(merged.len(), 4);

        let seen = provider.api.session.client().requests();
        assert_eq!(
            seen[2].url,
            "https://f2m.example/api/rental/externalapi/v1/vehicles/stuttgart?globalVersion=5"
        );
        assert!(
            cache
                .path()
                .join("free2move_stuttgart/vehicles_stuttgart_latest.json")
                .is_file()
        );
    }

    #[tokio::test]
    async fn test_operating_area_becomes_restricting_zone() {
        let cache = TempDir::new().unwrap();
        let area = r#"{"type": "Feature", "geometry": {"type": "MultiPolygon", "coordinates": [
            [[[0, 0], [1, 0], [1, 1], [0, 0]]]
        ]}, "properties": {"upstream": true}}"#;
        let mut provider = provider(&cache, vec![(200, area)]);

        let zones = provider.load_geofencing_zones().await.unwrap().unwrap();

        assert_eq!(
            zones[0]["geometry"]["coordinates"],
            json!([[[[0, 0], [1, 1], [1, 0], [0, 0]]]])
        );
        assert_eq!(zones[0]["properties"]["name"], json!("stuttgart"));
        assert_eq!(zones[0]["properties"]["rules"][0]["ride_allowed"], json!(false));
    }

    #[test]
    fn test_reverse_polygon_rings() {
        let mut geometry = json!({"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [0, 0]]]});
        reverse_rings(&mut geometry);
        assert_eq!(geometry["coordinates"], json!([[[0, 0], [1, 1], [0, 1], [0, 0]]]));
    }

    #[test]
    fn test_missing_location_id_is_rejected() {
        let config = FeedConfig::from_json(
            r#"{"feed_data": {"system_information": {}}, "provider_data": {"location_alias": "x"}}"#,
        )
        .unwrap();
        let cache = TempDir::new().unwrap();
        let api = Free2moveApi::new(
            ScriptedClient::new(vec![]),
            "https://f2m.example",
            "u",
            "p",
            cache.path(),
            RetryPolicy::default(),
        );
        assert!(Free2moveProvider::new(config, api).is_err());
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("FIAT_500_weiß"), "FIAT_500_weiss");
        assert_eq!(normalize_id("mini_3-tuerer_rose gold"), "mini_3-tuerer_rose_gold");
    }
}
