//! Migration of feed content from schema 2.3 shape to 3.0 shape.
//!
//! Every step checks the current shape of a field before touching it, so
//! content that is already in 3.0 shape passes through unchanged.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::warn;

use crate::model::{FeedContent, Record, str_field};
use crate::schema::{iso_timestamp, iso_today};

static STRICT_PHONE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[0-9]+$").expect("phone number pattern is valid"));

/// Free-text system information fields that become localized in 3.0.
const SYSTEM_LOCALIZED_FIELDS: &[&str] = &[
    "name",
    "short_name",
    "operator",
    "attribution_organization_name",
    "terms_url",
    "privacy_url",
];

/// Free-text fields of all other entities that become localized in 3.0.
const ENTITY_LOCALIZED_FIELDS: &[&str] = &["name", "description", "make", "model", "summary"];

const RENAMED_FIELDS: &[(&str, &str)] = &[
    ("bike_id", "vehicle_id"),
    ("num_bikes_available", "num_vehicles_available"),
];

const DEFAULT_OPENING_HOURS: &str = "24/7";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("{entity} lacks required field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
}

/// Migrates all collections of a feed to 3.0 shape.
///
/// The feed language is taken from the (migrated) system information and
/// used for every localized text.
///
/// # Errors
///
/// Returns [`MigrationError::MissingField`] if system information has no
/// `system_id` or no language.
pub fn migrate_to_v3(content: FeedContent) -> Result<FeedContent, MigrationError> {
    let (system_information, language) = migrate_system_information(content.system_information)?;

    let migrate_all = |records: Option<Vec<Record>>| {
        records.map(|list| {
            list.into_iter()
                .map(|mut r| {
                    migrate_entity(&mut r, &language);
                    r
                })
                .collect::<Vec<_>>()
        })
    };

    let geofencing_zones = content.geofencing_zones.map(|features| {
        features
            .into_iter()
            .map(|mut feature| {
                if let Some(Value::Object(properties)) = feature.get_mut("properties") {
                    migrate_entity(properties, &language);
                }
                feature
            })
            .collect()
    });

    Ok(FeedContent {
        system_information,
        station_information: migrate_all(content.station_information),
        station_status: migrate_all(content.station_status),
        vehicle_types: migrate_all(content.vehicle_types),
        vehicles: migrate_all(content.vehicles),
        geofencing_zones,
        pricing_plans: migrate_all(content.pricing_plans),
        alerts: migrate_all(content.alerts),
    })
}

/// Migrates system information and returns it with the feed language.
///
/// # Errors
///
/// Returns [`MigrationError::MissingField`] if `system_id` or the language
/// is missing.
pub fn migrate_system_information(mut info: Record) -> Result<(Record, String), MigrationError> {
    if !info.contains_key("system_id") {
        return Err(MigrationError::MissingField {
            entity: "system_information",
            field: "system_id",
        });
    }
    let system_id = str_field(&info, "system_id").unwrap_or_default().to_string();

    if let Some(language) = info.remove("language") {
        info.entry("languages").or_insert_with(|| json!([language]));
    }
    let language = info
        .get("languages")
        .and_then(Value::as_array)
        .and_then(|languages| languages.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(MigrationError::MissingField {
            entity: "system_information",
            field: "language",
        })?;

    for field in SYSTEM_LOCALIZED_FIELDS {
        localize(&mut info, field, &language);
    }

    sanitize_phone_number(&mut info, &system_id);

    if !info.contains_key("opening_hours") {
        warn!(system_id = %system_id, default = DEFAULT_OPENING_HOURS, "system_information lacks opening_hours, using default");
        info.insert("opening_hours".to_string(), json!(DEFAULT_OPENING_HOURS));
    }

    if !info.contains_key("privacy_last_updated") {
        let today = iso_today();
        warn!(system_id = %system_id, default = %today, "system_information lacks privacy_last_updated, using today");
        info.insert("privacy_last_updated".to_string(), json!(today));
    }

    if info.contains_key("license_url") && info.contains_key("license_id") {
        warn!(system_id = %system_id, "license_url and license_id are mutually exclusive, dropping license_url");
        info.remove("license_url");
    }

    Ok((info, language))
}

/// Migrates one station, vehicle, vehicle type, plan, alert or zone record.
pub fn migrate_entity(record: &mut Record, language: &str) {
    for field in ENTITY_LOCALIZED_FIELDS {
        localize(record, field, language);
    }

    for (old, new) in RENAMED_FIELDS {
        if !record.contains_key(*new) {
            if let Some(value) = record.remove(*old) {
                record.insert(new.to_string(), value);
            }
        }
    }

    if let Some(value) = record.get("last_reported") {
        let epoch = value.as_i64().or_else(|| value.as_f64().map(|f| f as i64));
        if let Some(epoch) = epoch {
            record.insert("last_reported".to_string(), json!(iso_timestamp(epoch)));
        }
    }
}

/// Wraps a plain string field into a single-entry localized text list.
fn localize(record: &mut Record, field: &str, language: &str) {
    if let Some(Value::String(text)) = record.get(field) {
        let localized = json!([{"language": language, "text": text}]);
        record.insert(field.to_string(), localized);
    }
}

fn sanitize_phone_number(info: &mut Record, system_id: &str) {
    let Some(phone) = str_field(info, "phone_number").map(str::to_string) else {
        return;
    };
    if STRICT_PHONE_NUMBER.is_match(&phone) {
        return;
    }

    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        warn!(system_id, phone_number = %phone, "phone_number contains no digits, dropping it");
        info.remove("phone_number");
        return;
    }

    let sanitized = if phone.trim_start().starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    };
    warn!(system_id, phone_number = %phone, sanitized = %sanitized, "phone_number does not match +digits, sanitized");
    info.insert("phone_number".to_string(), json!(sanitized));
}
