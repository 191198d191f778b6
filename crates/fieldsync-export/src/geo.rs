// crates/fieldsync-export/src/geo.rs
// ============================================================================
// Module: GeoJSON Transform
// Description: Maps upstream records into a GeoJSON FeatureCollection file.
// Purpose: Produce the immutable export artifact consumed by the uploader.
// Dependencies: fieldsync-core, serde_json, time
// ============================================================================

//! ## Overview
//! [`transform_records`] is a pure mapping from a run's records to one
//! in-memory [`ExportFile`]. Each record becomes a Point feature: longitude
//! and latitude are read from the payload and map to `null` when absent or
//! non-numeric, never to an error. Extended attributes are projected into
//! feature properties through a fixed attribute-id table; unknown ids are
//! skipped. Any shape that cannot be mapped aborts file production, so a
//! partial collection is never emitted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use fieldsync_core::TransformError;
use fieldsync_core::UpstreamRecord;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// MIME type of the exported feature collection.
pub const EXPORT_MIME_TYPE: &str = "application/geo+json";

/// Fixed mapping from upstream extended-attribute ids to property names.
const ATTRIBUTE_NAMES: &[(&str, &str)] = &[
    ("101", "sample_depth_m"),
    ("102", "water_temperature_c"),
    ("103", "ph"),
    ("104", "dissolved_oxygen_mg_l"),
    ("105", "conductivity_us_cm"),
];

// ============================================================================
// SECTION: Export File
// ============================================================================

/// Immutable in-memory export artifact.
///
/// # Invariants
/// - `name` is unique across runs via its embedded UTC timestamp.
/// - `bytes` holds a complete serialized feature collection, never partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    /// Object name under the destination bucket.
    pub name: String,
    /// MIME type sent as the upload content type.
    pub mime_type: &'static str,
    /// Serialized feature collection.
    pub bytes: Vec<u8>,
}

// ============================================================================
// SECTION: Transform
// ============================================================================

/// Transforms records into an export file stamped with the current time.
///
/// # Errors
///
/// Returns [`TransformError`] when a record cannot be mapped or the
/// collection cannot be serialized.
pub fn transform_records(records: &[UpstreamRecord]) -> Result<ExportFile, TransformError> {
    transform_records_at(records, OffsetDateTime::now_utc())
}

/// Transforms records into an export file stamped with the given instant.
///
/// # Errors
///
/// Returns [`TransformError`] when a record cannot be mapped or the
/// collection cannot be serialized.
pub fn transform_records_at(
    records: &[UpstreamRecord],
    stamp: OffsetDateTime,
) -> Result<ExportFile, TransformError> {
    let mut features = Vec::with_capacity(records.len());
    for record in records {
        features.push(feature_for(record)?);
    }
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    let bytes = serde_json::to_vec(&collection)
        .map_err(|err| TransformError::Serialize(err.to_string()))?;
    Ok(ExportFile {
        name: export_name(stamp)?,
        mime_type: EXPORT_MIME_TYPE,
        bytes,
    })
}

/// Builds the timestamped object name for an export.
fn export_name(stamp: OffsetDateTime) -> Result<String, TransformError> {
    let format =
        format_description!("[year][month][day]T[hour][minute][second]Z");
    let stamped = stamp
        .to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map_err(|err| TransformError::Serialize(format!("export name format: {err}")))?;
    Ok(format!("observations_{stamped}.geojson"))
}

/// Maps one record into a GeoJSON Point feature.
fn feature_for(record: &UpstreamRecord) -> Result<Value, TransformError> {
    let payload = record.payload();
    let mut properties = Map::new();
    properties.insert("id".to_string(), Value::String(record.id().to_string()));
    properties.insert("name".to_string(), payload.get("name").cloned().unwrap_or(Value::Null));
    properties.insert(
        "description".to_string(),
        payload.get("description").cloned().unwrap_or(Value::Null),
    );
    apply_extended_attributes(record, payload, &mut properties)?;
    Ok(json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [coordinate(payload, "longitude"), coordinate(payload, "latitude")],
        },
        "properties": Value::Object(properties),
    }))
}

/// Reads a coordinate field, mapping absent or non-numeric values to null.
fn coordinate(payload: &Value, field: &str) -> Value {
    payload.get(field).and_then(Value::as_f64).map_or(Value::Null, |value| json!(value))
}

/// Projects known extended attributes into feature properties.
fn apply_extended_attributes(
    record: &UpstreamRecord,
    payload: &Value,
    properties: &mut Map<String, Value>,
) -> Result<(), TransformError> {
    let Some(attributes) = payload.get("extendedAttributes") else {
        return Ok(());
    };
    let Some(attributes) = attributes.as_array() else {
        return Err(TransformError::Record {
            id: record.id().to_string(),
            message: "extendedAttributes is not an array".to_string(),
        });
    };
    for attribute in attributes {
        let Some(id) = attribute.get("attributeId").map(attribute_id_string) else {
            continue;
        };
        let Some((_, name)) = ATTRIBUTE_NAMES.iter().find(|(known, _)| *known == id) else {
            continue;
        };
        let value = attribute.get("value").cloned().unwrap_or(Value::Null);
        properties.insert((*name).to_string(), value);
    }
    Ok(())
}

/// Canonicalizes an attribute id to its string form for table lookup.
fn attribute_id_string(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    //! Test-only lint relaxations for panic-based assertions.
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use fieldsync_core::UpstreamRecord;
    use serde_json::Value;
    use serde_json::json;
    use time::macros::datetime;

    use super::transform_records_at;

    /// Parses the serialized collection back for assertions.
    fn collection(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).expect("valid geojson")
    }

    #[test]
    fn records_become_point_features() {
        let record = UpstreamRecord::from_value(json!({
            "id": "obs-1",
            "name": "Station 4",
            "description": "weekly sample",
            "longitude": 24.94,
            "latitude": 60.17,
        }))
        .expect("record");

        let file =
            transform_records_at(&[record], datetime!(2024-01-02 03:04:05 UTC)).expect("file");
        assert_eq!(file.name, "observations_20240102T030405Z.geojson");
        assert_eq!(file.mime_type, "application/geo+json");

        let body = collection(&file.bytes);
        assert_eq!(body["type"], json!("FeatureCollection"));
        let feature = &body["features"][0];
        assert_eq!(feature["geometry"]["coordinates"], json!([24.94, 60.17]));
        assert_eq!(feature["properties"]["id"], json!("obs-1"));
        assert_eq!(feature["properties"]["name"], json!("Station 4"));
    }

    #[test]
    fn missing_coordinates_map_to_null() {
        let record =
            UpstreamRecord::from_value(json!({"id": "obs-2", "name": "no fix"})).expect("record");

        let file =
            transform_records_at(&[record], datetime!(2024-01-02 03:04:05 UTC)).expect("file");
        let body = collection(&file.bytes);
        assert_eq!(body["features"][0]["geometry"]["coordinates"], json!([null, null]));
    }

    #[test]
    fn non_numeric_coordinates_map_to_null() {
        let record = UpstreamRecord::from_value(json!({
            "id": "obs-3",
            "longitude": "east-ish",
            "latitude": 60.17,
        }))
        .expect("record");

        let file =
            transform_records_at(&[record], datetime!(2024-01-02 03:04:05 UTC)).expect("file");
        let body = collection(&file.bytes);
        assert_eq!(body["features"][0]["geometry"]["coordinates"], json!([null, 60.17]));
    }

    #[test]
    fn known_attributes_project_into_properties() {
        let record = UpstreamRecord::from_value(json!({
            "id": "obs-4",
            "extendedAttributes": [
                {"attributeId": 102, "value": 7.5},
                {"attributeId": "103", "value": 6.9},
                {"attributeId": 999, "value": "ignored"},
            ],
        }))
        .expect("record");

        let file =
            transform_records_at(&[record], datetime!(2024-01-02 03:04:05 UTC)).expect("file");
        let properties = &collection(&file.bytes)["features"][0]["properties"];
        assert_eq!(properties["water_temperature_c"], json!(7.5));
        assert_eq!(properties["ph"], json!(6.9));
        assert!(properties.get("999").is_none());
    }

    #[test]
    fn malformed_attribute_shape_aborts_the_file() {
        let record = UpstreamRecord::from_value(json!({
            "id": "obs-5",
            "extendedAttributes": {"attributeId": 101},
        }))
        .expect("record");

        let error = transform_records_at(&[record], datetime!(2024-01-02 03:04:05 UTC))
            .expect_err("shape error");
        assert!(error.to_string().contains("obs-5"));
    }

    #[test]
    fn empty_run_exports_an_empty_collection() {
        let file = transform_records_at(&[], datetime!(2024-01-02 03:04:05 UTC)).expect("file");
        let body = collection(&file.bytes);
        assert_eq!(body["features"], json!([]));
    }
}
