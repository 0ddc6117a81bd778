//! Vehicle availability per station, derived from the vehicle collection.

use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::model::{EntityMap, Record, flag, str_field};

/// `vehicle_type_id` -> number of vehicles.
type TypeCounts = BTreeMap<String, u64>;

/// `station_id` -> counts per vehicle type.
type StationCounts = BTreeMap<String, TypeCounts>;

/// Returns a copy of `station_status` with `vehicle_types_available` and
/// `num_bikes_available` derived from `vehicles`.
///
/// A vehicle counts as available when it is neither reserved nor disabled.
/// Types seen at a station but with no available vehicle are listed with a
/// count of zero, and entries the adapter set up front are kept. Vehicles
/// without a `station_id` are free-floating and ignored here.
///
/// If either input is empty, the status collection is returned unchanged.
pub fn derive_availability(station_status: &EntityMap, vehicles: &EntityMap) -> EntityMap {
    if station_status.is_empty() || vehicles.is_empty() {
        return station_status.clone();
    }

    let (all, available) = count_by_station_and_type(vehicles);
    debug!(
        stations_with_vehicles = all.len(),
        stations_with_available = available.len(),
        "Vehicle counts grouped by station"
    );

    station_status
        .iter()
        .map(|(station_id, status)| {
            let mut status = status.clone();
            match all.get(station_id) {
                Some(known) => apply_counts(&mut status, known, available.get(station_id)),
                None => mark_without_vehicles(&mut status),
            }
            (station_id.clone(), status)
        })
        .collect()
}

fn count_by_station_and_type(vehicles: &EntityMap) -> (StationCounts, StationCounts) {
    let mut all = StationCounts::new();
    let mut available = StationCounts::new();

    for (vehicle_id, vehicle) in vehicles {
        let Some(station_id) = str_field(vehicle, "station_id") else {
            continue;
        };
        let Some(type_id) = str_field(vehicle, "vehicle_type_id") else {
            debug!(vehicle_id, "Vehicle without vehicle_type_id skipped");
            continue;
        };

        *all.entry(station_id.to_string())
            .or_default()
            .entry(type_id.to_string())
            .or_default() += 1;

        if !flag(vehicle, "is_reserved") && !flag(vehicle, "is_disabled") {
            *available
                .entry(station_id.to_string())
                .or_default()
                .entry(type_id.to_string())
                .or_default() += 1;
        }
    }

    (all, available)
}

fn apply_counts(status: &mut Record, known: &TypeCounts, available: Option<&TypeCounts>) {
    let fresh: TypeCounts = known
        .keys()
        .map(|type_id| {
            let count = available
                .and_then(|a| a.get(type_id))
                .copied()
                .unwrap_or(0);
            (type_id.clone(), count)
        })
        .collect();

    let mut merged: Vec<Value> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    if let Some(Value::Array(existing)) = status.get("vehicle_types_available") {
        for entry in existing {
            let Some(type_id) = entry.get("vehicle_type_id").and_then(Value::as_str) else {
                continue;
            };
            if !seen.insert(type_id.to_string()) {
                continue;
            }
            let count = fresh
                .get(type_id)
                .copied()
                .or_else(|| entry.get("count").and_then(Value::as_u64))
                .unwrap_or(0);
            merged.push(json!({"vehicle_type_id": type_id, "count": count}));
        }
    }

    for (type_id, count) in &fresh {
        if !seen.contains(type_id) {
            merged.push(json!({"vehicle_type_id": type_id, "count": count}));
        }
    }

    let total: u64 = merged
        .iter()
        .filter_map(|entry| entry.get("count").and_then(Value::as_u64))
        .sum();

    status.insert("vehicle_types_available".to_string(), Value::Array(merged));
    status.insert("num_bikes_available".to_string(), Value::from(total));
}

/// Stations hosting no vehicles keep an adapter-supplied
/// `num_bikes_available` (static capacity figures) and default to zero.
fn mark_without_vehicles(status: &mut Record) {
    status.insert(
        "vehicle_types_available".to_string(),
        Value::Array(Vec::new()),
    );
    status
        .entry("num_bikes_available")
        .or_insert_with(|| Value::from(0));
}
