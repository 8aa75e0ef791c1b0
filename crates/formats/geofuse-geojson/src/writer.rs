//! `GeoJSON` serialization of typed layers.

use std::io::Write;

use geofuse_core_common::{DatasetError, Feature, Result, Schema, Value};
use geojson::{FeatureCollection, JsonObject, JsonValue};
use serde_json::json;

use crate::parser::{CRS_MEMBER, DATE_FORMAT, DATETIME_FORMAT, SCHEMA_MEMBER};

/// Options controlling `GeoJSON` output.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonWriterOptions {
    /// Indent output for readability.
    pub pretty: bool,
}

impl GeoJsonWriterOptions {
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Writes one layer as a `FeatureCollection` carrying `schema` and `crs`
/// foreign members.
///
/// # Errors
///
/// Returns an error if serialization or the underlying write fails.
pub fn write_layer<W: Write>(
    writer: &mut W,
    schema: &Schema,
    features: &[Feature],
    options: &GeoJsonWriterOptions,
) -> Result<()> {
    let collection = FeatureCollection {
        bbox: None,
        features: features.iter().map(feature_to_geojson).collect(),
        foreign_members: Some(foreign_members(schema)),
    };

    let result = if options.pretty {
        serde_json::to_writer_pretty(&mut *writer, &collection)
    } else {
        serde_json::to_writer(&mut *writer, &collection)
    };
    result.map_err(|err| DatasetError::Parse {
        context: "GeoJSON output".to_string(),
        message: err.to_string(),
    })?;
    writer
        .write_all(b"\n")
        .map_err(|source| DatasetError::Io {
            path: "<stream>".into(),
            source,
        })
}

fn foreign_members(schema: &Schema) -> JsonObject {
    let properties: JsonObject = schema
        .fields()
        .iter()
        .map(|f| (f.name.clone(), JsonValue::String(f.field_type.as_str().to_string())))
        .collect();

    let mut members = JsonObject::new();
    members.insert(
        SCHEMA_MEMBER.to_string(),
        json!({
            "geometry": schema.geometry_kind().as_str(),
            "properties": properties,
        }),
    );
    if let Some(crs) = schema.crs() {
        members.insert(
            CRS_MEMBER.to_string(),
            json!({"type": "name", "properties": {"name": crs.as_str()}}),
        );
    }
    members
}

fn feature_to_geojson(feature: &Feature) -> geojson::Feature {
    let properties: JsonObject = feature
        .properties
        .iter()
        .map(|(name, value)| (name.clone(), value_to_json(value)))
        .collect();

    geojson::Feature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub(crate) fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => JsonValue::String(dt.format(DATETIME_FORMAT).to_string()),
    }
}
