//! Value and geometry coercion.
//!
//! [`convert`] is the type conversion policy applied by `type_convert`
//! mapping entries. It is lenient in the same places a hand-maintained
//! attribute table usually needs it to be: integers accept decimal text and
//! truncate, booleans accept the usual yes/no spellings, and text that looks
//! like no known date layout is kept as text.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use geo_types::{Geometry, MultiLineString, MultiPoint, MultiPolygon};
use geofuse_core_common::{FieldType, GeometryKind, Value};
use thiserror::Error;

/// Text recognised as `true` when converting to [`FieldType::Bool`].
pub const TRUE_WORDS: [&str; 5] = ["true", "yes", "1", "t", "y"];

/// Date layouts tried in order; the flag marks layouts with a time part.
const DATE_PATTERNS: [(&str, bool); 5] = [
    ("%Y-%m-%d", false),
    ("%Y/%m/%d", false),
    ("%d-%m-%Y", false),
    ("%d/%m/%Y", false),
    ("%Y-%m-%d %H:%M:%S", true),
];

/// A value that could not be coerced into the requested type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert '{value}' to {target}: {reason}")]
pub struct ConversionFailure {
    /// Text form of the rejected value
    pub value: String,
    /// Requested type
    pub target: FieldType,
    /// Why it was rejected
    pub reason: String,
}

impl ConversionFailure {
    pub fn new(value: &Value, target: FieldType, reason: impl Into<String>) -> Self {
        Self {
            value: value.to_string(),
            target,
            reason: reason.into(),
        }
    }
}

/// Coerces `value` into `target`.
///
/// `Null` always converts to `Null`. Date targets never fail: text in no
/// known layout and non-text input are returned unchanged.
///
/// # Errors
///
/// Returns [`ConversionFailure`] when a numeric target cannot be reached.
pub fn convert(value: &Value, target: FieldType) -> Result<Value, ConversionFailure> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match target {
        FieldType::String => Ok(Value::String(value.to_string())),
        FieldType::Int => to_int(value),
        FieldType::Float => to_float(value).map(Value::Float),
        FieldType::Bool => Ok(Value::Bool(to_bool(value))),
        FieldType::Date | FieldType::DateTime => Ok(to_temporal(value, target)),
    }
}

fn to_float(value: &Value) -> Result<f64, ConversionFailure> {
    match value {
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| ConversionFailure::new(value, FieldType::Float, err.to_string())),
        #[allow(clippy::cast_precision_loss)]
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Date(_) | Value::DateTime(_) => Err(ConversionFailure::new(
            value,
            FieldType::Float,
            "not a number",
        )),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_int(value: &Value) -> Result<Value, ConversionFailure> {
    if let Value::Int(i) = value {
        return Ok(Value::Int(*i));
    }
    let parsed = to_float(value).map_err(|failure| ConversionFailure {
        target: FieldType::Int,
        ..failure
    })?;
    if !parsed.is_finite() {
        return Err(ConversionFailure::new(value, FieldType::Int, "not a finite number"));
    }
    let truncated = parsed.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(ConversionFailure::new(value, FieldType::Int, "out of range"));
    }
    Ok(Value::Int(truncated as i64))
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::String(text) => TRUE_WORDS.contains(&text.to_lowercase().as_str()),
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Date(_) | Value::DateTime(_) => true,
        Value::Null => false,
    }
}

fn to_temporal(value: &Value, target: FieldType) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };
    let Some(parsed) = parse_datetime(text) else {
        return value.clone();
    };
    if target == FieldType::Date {
        Value::Date(parsed.date())
    } else {
        Value::DateTime(parsed)
    }
}

/// Parses `text` with the first matching layout. Date-only layouts yield
/// midnight.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_PATTERNS.iter().find_map(|(pattern, has_time)| {
        if *has_time {
            NaiveDateTime::parse_from_str(text, pattern).ok()
        } else {
            NaiveDate::parse_from_str(text, pattern)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        }
    })
}

/// A geometry that cannot be expressed as the requested kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {from} geometry to {to}")]
pub struct GeometryConversionError {
    pub from: GeometryKind,
    pub to: GeometryKind,
}

/// Promotes a single-part geometry to its multi-part counterpart, or demotes
/// a multi-part geometry by keeping its first member.
///
/// Geometries already of the requested kind, and any geometry when `target`
/// is [`GeometryKind::Unknown`], are returned unchanged.
///
/// # Errors
///
/// Fails for unrelated kinds and for empty multi-part geometries being
/// demoted.
pub fn convert_geometry_kind(
    geometry: Geometry<f64>,
    target: GeometryKind,
) -> Result<Geometry<f64>, GeometryConversionError> {
    let from = GeometryKind::of(&geometry);
    if from == target || target.is_unknown() {
        return Ok(geometry);
    }
    let error = GeometryConversionError { from, to: target };

    if from.multi() == Some(target) {
        return Ok(promote_to_multi(geometry));
    }

    let converted = match (geometry, target) {
        (Geometry::MultiPoint(m), GeometryKind::Point) => m.0.into_iter().next().map(Into::into),
        (Geometry::MultiLineString(m), GeometryKind::LineString) => {
            m.0.into_iter().next().map(Into::into)
        },
        (Geometry::MultiPolygon(m), GeometryKind::Polygon) => {
            m.0.into_iter().next().map(Into::into)
        },
        _ => None,
    };
    converted.ok_or(error)
}

/// Wraps a point, line string or polygon in its multi-part counterpart.
/// Other geometries are returned unchanged.
#[must_use]
pub fn promote_to_multi(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Point(p) => MultiPoint(vec![p]).into(),
        Geometry::LineString(l) => MultiLineString(vec![l]).into(),
        Geometry::Polygon(p) => MultiPolygon(vec![p]).into(),
        other => other,
    }
}
