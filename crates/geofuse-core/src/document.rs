//! JSON mapping documents.
//!
//! A document is a JSON object keyed by source field name, each value a
//! record:
//!
//! ```json
//! {
//!   "point_id": {"target_field": "id", "conversion": "direct", "default_value": null},
//!   "height":   {"target_field": "height", "conversion": "type_convert",
//!                "source_type": "str", "target_type": "float", "default_value": 0.0}
//! }
//! ```
//!
//! Documents may also be keyed by layer first (`{"points": {"point_id": {..}}}`),
//! in which case each layer gets its own mapping.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use geofuse_core_common::{FieldType, Value};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::conversion::convert;
use crate::error::MappingIoError;
use crate::mapping::{Conversion, Mapping, MappingEntry};

type JsonObject = Map<String, JsonValue>;

/// A loaded mapping document.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingDocument {
    /// One mapping applied to every layer.
    Fields(Mapping),
    /// A mapping per layer name, in document order.
    Layers(Vec<(String, Mapping)>),
}

impl MappingDocument {
    /// The mapping that applies to `layer`, if the document has one.
    #[must_use]
    pub fn for_layer(&self, layer: &str) -> Option<&Mapping> {
        match self {
            MappingDocument::Fields(mapping) => Some(mapping),
            MappingDocument::Layers(layers) => layers
                .iter()
                .find(|(name, _)| name == layer)
                .map(|(_, mapping)| mapping),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ConversionKind {
    #[default]
    Direct,
    TypeConvert,
    NewField,
    Custom,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_field: Option<String>,
    #[serde(default)]
    conversion: ConversionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function: Option<String>,
    #[serde(default)]
    default_value: JsonValue,
}

impl EntryRecord {
    fn into_entry(self, source_field: &str) -> Result<MappingEntry, MappingIoError> {
        let invalid = |reason: &str| MappingIoError::InvalidEntry {
            field: source_field.to_string(),
            reason: reason.to_string(),
        };

        let conversion = match self.conversion {
            ConversionKind::Direct => Conversion::Direct,
            ConversionKind::TypeConvert => Conversion::TypeConvert {
                source_type: self.source_type,
                target_type: self
                    .target_type
                    .ok_or_else(|| invalid("type_convert requires target_type"))?,
            },
            ConversionKind::NewField => Conversion::NewField {
                field_type: self
                    .field_type
                    .ok_or_else(|| invalid("new_field requires field_type"))?,
            },
            ConversionKind::Custom => Conversion::Custom {
                function: self
                    .function
                    .ok_or_else(|| invalid("custom requires function"))?,
                field_type: self.field_type.unwrap_or(FieldType::String),
            },
        };

        let mut default_value =
            json_to_value(&self.default_value).ok_or_else(|| invalid("default_value must be a scalar"))?;
        if let Conversion::TypeConvert { target_type, .. } = &conversion {
            default_value = convert(&default_value, *target_type)
                .map_err(|failure| invalid(&format!("default_value: {}", failure.reason)))?;
        }

        Ok(MappingEntry {
            source_field: source_field.to_string(),
            target_field: self.target_field.unwrap_or_else(|| source_field.to_string()),
            conversion,
            default_value,
        })
    }

    fn from_entry(entry: &MappingEntry) -> Self {
        let mut record = EntryRecord {
            target_field: Some(entry.target_field.clone()),
            conversion: ConversionKind::Direct,
            source_type: None,
            target_type: None,
            field_type: None,
            function: None,
            default_value: value_to_json(&entry.default_value),
        };
        match &entry.conversion {
            Conversion::Direct => {},
            Conversion::TypeConvert {
                source_type,
                target_type,
            } => {
                record.conversion = ConversionKind::TypeConvert;
                record.source_type = *source_type;
                record.target_type = Some(*target_type);
            },
            Conversion::NewField { field_type } => {
                record.conversion = ConversionKind::NewField;
                record.field_type = Some(*field_type);
            },
            Conversion::Custom {
                function,
                field_type,
            } => {
                record.conversion = ConversionKind::Custom;
                record.function = Some(function.clone());
                record.field_type = Some(*field_type);
            },
        }
        record
    }
}

fn json_to_value(json: &JsonValue) -> Option<Value> {
    match json {
        JsonValue::Null => Some(Value::Null),
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        Value::String(_) | Value::Date(_) | Value::DateTime(_) => JsonValue::String(value.to_string()),
    }
}

/// Layer-keyed documents have only non-empty objects of objects at the top.
fn is_layered(root: &JsonObject) -> bool {
    !root.is_empty()
        && root.values().all(|v| {
            v.as_object()
                .is_some_and(|inner| !inner.is_empty() && inner.values().all(JsonValue::is_object))
        })
}

fn parse_fields(object: &JsonObject, path: &Path) -> Result<Mapping, MappingIoError> {
    let mut mapping = Mapping::new();
    for (field, record) in object {
        let record: EntryRecord =
            serde_json::from_value(record.clone()).map_err(|err| MappingIoError::Malformed {
                path: path.to_path_buf(),
                message: format!("entry '{field}': {err}"),
            })?;
        mapping.insert(record.into_entry(field)?);
    }
    Ok(mapping)
}

/// Parses a mapping document from text. `path` is only used in errors.
///
/// # Errors
///
/// Returns [`MappingIoError::Malformed`] for invalid JSON or unknown keys and
/// conversion kinds, and [`MappingIoError::InvalidEntry`] for entries missing
/// the type their conversion needs.
pub fn parse_mapping(text: &str, path: &Path) -> Result<MappingDocument, MappingIoError> {
    let root: JsonObject = serde_json::from_str(text).map_err(|err| MappingIoError::Malformed {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    if is_layered(&root) {
        let mut layers = Vec::with_capacity(root.len());
        for (layer, fields) in &root {
            if let JsonValue::Object(fields) = fields {
                layers.push((layer.clone(), parse_fields(fields, path)?));
            }
        }
        Ok(MappingDocument::Layers(layers))
    } else {
        Ok(MappingDocument::Fields(parse_fields(&root, path)?))
    }
}

/// Loads a mapping document from disk.
///
/// # Errors
///
/// Fails if the file is missing or unreadable, or as [`parse_mapping`].
pub fn load_mapping(path: impl AsRef<Path>) -> Result<MappingDocument, MappingIoError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => MappingIoError::NotFound {
            path: path.to_path_buf(),
        },
        _ => MappingIoError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let document = parse_mapping(&text, path)?;
    match &document {
        MappingDocument::Fields(mapping) => {
            info!("Loaded mapping with {} field(s) from {}", mapping.len(), path.display());
        },
        MappingDocument::Layers(layers) => {
            info!("Loaded mapping for {} layer(s) from {}", layers.len(), path.display());
        },
    }
    Ok(document)
}

/// Renders a mapping as a pretty-printed JSON document.
#[must_use]
pub fn render_mapping(mapping: &Mapping) -> String {
    let root: JsonObject = mapping
        .iter()
        .map(|entry| {
            let record = serde_json::to_value(EntryRecord::from_entry(entry)).unwrap_or(JsonValue::Null);
            (entry.source_field.clone(), record)
        })
        .collect();
    let mut text = serde_json::to_string_pretty(&JsonValue::Object(root)).unwrap_or_default();
    text.push('\n');
    text
}

/// Saves a mapping as a flat, field-keyed document.
///
/// The document is written beside `path` first and renamed into place, so
/// a failed save leaves any previous file untouched.
///
/// # Errors
///
/// Returns [`MappingIoError::Write`] if the file cannot be written.
pub fn save_mapping(mapping: &Mapping, path: impl AsRef<Path>) -> Result<(), MappingIoError> {
    let path = path.as_ref();
    let write_error = |source| MappingIoError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let staging = staging_path(path);
    if let Err(source) = fs::write(&staging, render_mapping(mapping)) {
        let _ = fs::remove_file(&staging);
        return Err(write_error(source));
    }
    if let Err(source) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(write_error(source));
    }
    debug!("Saved mapping with {} field(s) to {}", mapping.len(), path.display());
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
