//! `GeoJSON` parsing into typed layers.

use std::convert::TryInto;

use chrono::{NaiveDate, NaiveDateTime};
use geo_types::Geometry;
use geofuse_core_common::{
    Crs, DatasetError, Feature, FieldType, GeometryKind, Result, Schema, Value,
};
use geojson::{FeatureCollection, GeoJson, Geometry as GeoJsonGeometry, JsonObject, JsonValue};

/// Foreign member carrying the declared layer schema.
pub const SCHEMA_MEMBER: &str = "schema";
/// Foreign member carrying the layer CRS (`{"type":"name","properties":{"name":..}}`).
pub const CRS_MEMBER: &str = "crs";

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A fully decoded layer.
#[derive(Debug, Clone)]
pub struct ParsedLayer {
    pub schema: Schema,
    pub features: Vec<Feature>,
}

struct RawFeature {
    properties: JsonObject,
    geometry: Option<Geometry<f64>>,
}

/// Parse raw bytes into a typed layer.
///
/// Accepts a `FeatureCollection`, a single `Feature` or geometry, or a
/// newline-delimited `GeoJSON` sequence.
///
/// # Errors
///
/// Returns [`DatasetError::Parse`] if the bytes are neither valid `GeoJSON`
/// nor a `GeoJSON` sequence, or if the declared schema is malformed.
pub fn parse_layer_bytes(bytes: &[u8], context: &str) -> Result<ParsedLayer> {
    let (raw, foreign) = match GeoJson::from_reader(std::io::Cursor::new(bytes)) {
        Ok(geojson) => geojson_to_raw(geojson, context)?,
        Err(primary_err) => match parse_sequence(bytes, context) {
            Ok(raw) => (raw, None),
            Err(sequence_err) => {
                return Err(DatasetError::Parse {
                    context: context.to_string(),
                    message: format!(
                        "not a FeatureCollection ({primary_err}); \
                         also not a GeoJSON sequence: {sequence_err}"
                    ),
                });
            },
        },
    };

    let declared = foreign
        .as_ref()
        .and_then(|members| members.get(SCHEMA_MEMBER))
        .map(|value| schema_from_json(value, context))
        .transpose()?;
    let crs = foreign
        .as_ref()
        .and_then(|members| members.get(CRS_MEMBER))
        .and_then(crs_from_json);

    let schema = match declared {
        Some(schema) => schema,
        None => infer_schema(&raw)?,
    }
    .with_crs(crs);

    let features = raw
        .into_iter()
        .map(|feature| {
            let properties = feature
                .properties
                .into_iter()
                .map(|(name, json)| {
                    let value = value_from_json(json, schema.field_type(&name));
                    (name, value)
                })
                .collect();
            Feature {
                geometry: feature.geometry,
                properties,
            }
        })
        .collect();

    Ok(ParsedLayer { schema, features })
}

fn geojson_to_raw(
    geojson: GeoJson,
    context: &str,
) -> Result<(Vec<RawFeature>, Option<JsonObject>)> {
    match geojson {
        GeoJson::FeatureCollection(FeatureCollection {
            features,
            foreign_members,
            ..
        }) => {
            let raw = features
                .into_iter()
                .map(|f| feature_to_raw(f, context))
                .collect::<Result<Vec<_>>>()?;
            Ok((raw, foreign_members))
        },
        GeoJson::Feature(feature) => Ok((vec![feature_to_raw(feature, context)?], None)),
        GeoJson::Geometry(geometry) => Ok((
            vec![RawFeature {
                properties: JsonObject::new(),
                geometry: Some(convert_geometry(geometry, context)?),
            }],
            None,
        )),
    }
}

fn feature_to_raw(feature: geojson::Feature, context: &str) -> Result<RawFeature> {
    let geometry = feature
        .geometry
        .map(|g| convert_geometry(g, context))
        .transpose()?;
    Ok(RawFeature {
        properties: feature.properties.unwrap_or_default(),
        geometry,
    })
}

fn convert_geometry(geometry: GeoJsonGeometry, context: &str) -> Result<Geometry<f64>> {
    geometry.try_into().map_err(|err| DatasetError::Parse {
        context: context.to_string(),
        message: format!("Failed to convert GeoJSON geometry: {err}"),
    })
}

fn parse_sequence(bytes: &[u8], context: &str) -> Result<Vec<RawFeature>> {
    let mut records = Vec::new();
    for (line_idx, raw_line) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_number = line_idx + 1;
        let line = std::str::from_utf8(raw_line)
            .map_err(|err| DatasetError::Parse {
                context: format!("{context} line {line_number}"),
                message: format!("GeoJSON line is not valid UTF-8: {err}"),
            })?
            .trim();

        if line.is_empty() {
            continue;
        }

        let geojson = line
            .parse::<GeoJson>()
            .map_err(|err| DatasetError::Parse {
                context: format!("{context} line {line_number}"),
                message: format!("Failed to parse GeoJSON feature: {err}"),
            })?;
        let (mut parsed, _) = geojson_to_raw(geojson, context)?;
        records.append(&mut parsed);
    }

    if records.is_empty() {
        Err(DatasetError::Parse {
            context: context.to_string(),
            message: "No GeoJSON features found".to_string(),
        })
    } else {
        Ok(records)
    }
}

fn schema_from_json(value: &JsonValue, context: &str) -> Result<Schema> {
    let malformed = |message: &str| DatasetError::Parse {
        context: format!("{context} schema"),
        message: message.to_string(),
    };
    let object = value
        .as_object()
        .ok_or_else(|| malformed("schema member must be an object"))?;
    let geometry_kind = match object.get("geometry").and_then(JsonValue::as_str) {
        Some(kind) => kind.parse()?,
        None => GeometryKind::Unknown,
    };
    let mut fields = Vec::new();
    if let Some(properties) = object.get("properties") {
        let properties = properties
            .as_object()
            .ok_or_else(|| malformed("schema properties must be an object"))?;
        for (name, type_name) in properties {
            let type_name = type_name
                .as_str()
                .ok_or_else(|| malformed("field types must be strings"))?;
            fields.push((name.clone(), type_name.parse::<FieldType>()?));
        }
    }
    Schema::new(geometry_kind, fields)
}

fn crs_from_json(value: &JsonValue) -> Option<Crs> {
    match value {
        JsonValue::String(name) => Some(Crs::new(name.clone())),
        JsonValue::Object(object) => object
            .get("properties")
            .and_then(|p| p.get("name"))
            .and_then(JsonValue::as_str)
            .map(Crs::new),
        _ => None,
    }
}

/// Infers a schema from decoded features when none was declared.
///
/// Fields appear in first-seen order and take the type of their first
/// non-null value; integer and float values widen to float, any other
/// conflict degrades to string. Mixed geometry kinds yield `Unknown`.
fn infer_schema(features: &[RawFeature]) -> Result<Schema> {
    let mut geometry_kind: Option<GeometryKind> = None;
    let mut fields: Vec<(String, Option<FieldType>)> = Vec::new();

    for feature in features {
        if let Some(geometry) = &feature.geometry {
            let kind = GeometryKind::of(geometry);
            geometry_kind = match geometry_kind {
                None => Some(kind),
                Some(seen) if seen == kind => Some(seen),
                Some(_) => Some(GeometryKind::Unknown),
            };
        }

        for (name, json) in &feature.properties {
            let observed = json_field_type(json);
            match fields.iter_mut().find(|(existing, _)| existing == name) {
                None => fields.push((name.clone(), observed)),
                Some((_, slot)) => {
                    *slot = match (*slot, observed) {
                        (None, other) | (other, None) => other,
                        (Some(a), Some(b)) if a == b => Some(a),
                        (Some(FieldType::Int), Some(FieldType::Float))
                        | (Some(FieldType::Float), Some(FieldType::Int)) => Some(FieldType::Float),
                        _ => Some(FieldType::String),
                    };
                },
            }
        }
    }

    let fields = fields
        .into_iter()
        .map(|(name, ty)| (name, ty.unwrap_or(FieldType::String)));
    Schema::new(geometry_kind.unwrap_or_default(), fields)
}

fn json_field_type(value: &JsonValue) -> Option<FieldType> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(_) => Some(FieldType::Bool),
        JsonValue::Number(n) if n.is_i64() => Some(FieldType::Int),
        JsonValue::Number(_) => Some(FieldType::Float),
        JsonValue::String(_) | JsonValue::Array(_) | JsonValue::Object(_) => {
            Some(FieldType::String)
        },
    }
}

/// Decodes a JSON property into a [`Value`], honouring the declared type
/// for dates and float widening.
pub(crate) fn value_from_json(json: JsonValue, declared: Option<FieldType>) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match (n.as_i64(), declared) {
            (Some(i), Some(FieldType::Float)) => Value::Float(i as f64),
            (Some(i), _) => Value::Int(i),
            (None, _) => n.as_f64().map_or(Value::Null, Value::Float),
        },
        JsonValue::String(s) => match declared {
            Some(FieldType::Date) => NaiveDate::parse_from_str(&s, DATE_FORMAT)
                .map_or(Value::String(s), Value::Date),
            Some(FieldType::DateTime) => NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
                .map_or(Value::String(s), Value::DateTime),
            _ => Value::String(s),
        },
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collection_with_declared_schema() {
        let data = br#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "EPSG:4326"}},
  "schema": {"geometry": "Point", "properties": {"id": "int", "value": "float", "day": "date"}},
  "features": [
    {"type":"Feature","geometry":{"type":"Point","coordinates":[1.0,2.0]},"properties":{"id":1,"value":2,"day":"2024-01-15"}},
    {"type":"Feature","geometry":null,"properties":{"id":2,"value":null,"day":null}}
  ]
}"#;

        let layer = parse_layer_bytes(data, "test").expect("parse");
        assert_eq!(layer.schema.geometry_kind(), GeometryKind::Point);
        assert_eq!(layer.schema.crs(), Some(&Crs::new("EPSG:4326")));
        let names: Vec<&str> = layer.schema.field_names().collect();
        assert_eq!(names, vec!["id", "value", "day"]);
        assert_eq!(layer.features.len(), 2);
        assert_eq!(layer.features[0].property("value"), Some(&Value::Float(2.0)));
        assert_eq!(
            layer.features[0].property("day"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()))
        );
        assert!(layer.features[1].geometry.is_none());
    }

    #[test]
    fn schema_is_inferred_without_member() {
        let data = br#"{
  "type": "FeatureCollection",
  "features": [
    {"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{"id":1,"v":null,"score":1}},
    {"type":"Feature","geometry":{"type":"Point","coordinates":[3,4]},"properties":{"id":2,"v":"x","score":1.5}}
  ]
}"#;

        let layer = parse_layer_bytes(data, "test").expect("parse");
        let schema = &layer.schema;
        assert_eq!(schema.geometry_kind(), GeometryKind::Point);
        assert_eq!(schema.field_type("id"), Some(FieldType::Int));
        assert_eq!(schema.field_type("v"), Some(FieldType::String));
        assert_eq!(schema.field_type("score"), Some(FieldType::Float));
        assert!(schema.crs().is_none());
    }

    #[test]
    fn mixed_geometry_kinds_infer_unknown() {
        let data = br#"{"type":"FeatureCollection","features":[
    {"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{}},
    {"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]},"properties":{}}
]}"#;
        let layer = parse_layer_bytes(data, "mixed").expect("parse");
        assert_eq!(layer.schema.geometry_kind(), GeometryKind::Unknown);
    }

    #[test]
    fn parse_sequence_with_empty_lines() {
        let data = br#"{"type":"Feature","geometry":{"type":"Point","coordinates":[0,0]},"properties":{"id":1}}

{"type":"Feature","geometry":{"type":"Point","coordinates":[1,1]},"properties":{"id":2}}
"#;

        let layer = parse_layer_bytes(data, "seq").expect("sequence");
        assert_eq!(layer.features.len(), 2);
    }

    #[test]
    fn parse_invalid_json_combines_errors() {
        let err = parse_layer_bytes(b"not valid json at all", "invalid").unwrap_err();
        match err {
            DatasetError::Parse { message, context } => {
                assert!(message.contains("not a FeatureCollection"));
                assert!(message.contains("also not a GeoJSON sequence"));
                assert_eq!(context, "invalid");
            },
            other => panic!("Expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_schema_member_is_rejected() {
        let data = br#"{"type":"FeatureCollection","schema":{"properties":{"id":"blob"}},"features":[]}"#;
        assert!(parse_layer_bytes(data, "bad").is_err());
    }

    #[test]
    fn datetime_accepts_both_separators() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        for text in ["2024-03-01T12:00:00", "2024-03-01 12:00:00"] {
            let value = value_from_json(JsonValue::String(text.into()), Some(FieldType::DateTime));
            assert_eq!(value, Value::DateTime(expected));
        }
    }
}
