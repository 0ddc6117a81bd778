//! Version-agnostic entity model shared by adapters, transformer and writer.
//!
//! Entities are open attribute records keyed by their natural id. Only the
//! fields the pipeline reasons about get typed accessors; everything else is
//! passed through untouched.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single entity as an open attribute record.
pub type Record = Map<String, Value>;

/// A collection of entities keyed by natural id.
pub type EntityMap = BTreeMap<String, Record>;

/// The four station/vehicle collections an adapter reports per run.
///
/// Each collection is optional: a free-floating operator has no stations,
/// a docks-only operator may have no vehicles.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    pub station_information: Option<EntityMap>,
    pub station_status: Option<EntityMap>,
    pub vehicle_types: Option<EntityMap>,
    pub vehicles: Option<EntityMap>,
}

/// Everything one adapter produced for one publication cycle.
#[derive(Debug, Clone, Default)]
pub struct RawFeed {
    pub system_information: Record,
    pub fleet: Fleet,
    pub pricing_plans: Option<Vec<Record>>,
    pub alerts: Option<Vec<Record>>,
    pub geofencing_zones: Option<Vec<Record>>,
    /// Default `last_reported` for this run, epoch seconds.
    pub last_reported: i64,
}

/// Collections ready for serialization, already in target-schema shape.
#[derive(Debug, Clone, Default)]
pub struct FeedContent {
    pub system_information: Record,
    pub station_information: Option<Vec<Record>>,
    pub station_status: Option<Vec<Record>>,
    pub vehicle_types: Option<Vec<Record>>,
    pub vehicles: Option<Vec<Record>>,
    pub geofencing_zones: Option<Vec<Record>>,
    pub pricing_plans: Option<Vec<Record>>,
    pub alerts: Option<Vec<Record>>,
}

/// Returns `true` if the optional collection holds at least one entity.
pub fn is_present<T>(collection: &Option<Vec<T>>) -> bool {
    collection.as_ref().is_some_and(|c| !c.is_empty())
}

pub fn str_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

/// Reads a boolean flag; absent or non-boolean counts as `false`.
pub fn flag(record: &Record, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Builds a [`Record`] from a `serde_json::json!` object literal.
///
/// Non-object values yield an empty record.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Converts an [`EntityMap`] to the list form used in feed files.
pub fn into_list(map: Option<EntityMap>) -> Option<Vec<Record>> {
    map.map(|m| m.into_values().collect())
}
