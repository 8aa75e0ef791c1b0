//! Layer schema model: geometry kind, ordered typed fields and CRS.
//!
//! Schemas are immutable once constructed. Transformations (such as applying
//! a field mapping) produce new schemas rather than editing existing ones.

use std::fmt;
use std::str::FromStr;

use geo_types::Geometry;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{DatasetError, Result};

/// Scalar type of a layer attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
}

impl FieldType {
    /// All field types, in declaration order.
    pub const ALL: [FieldType; 6] = [
        FieldType::String,
        FieldType::Int,
        FieldType::Float,
        FieldType::Bool,
        FieldType::Date,
        FieldType::DateTime,
    ];

    /// Returns the canonical short name used in schema and mapping documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "str",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "str" | "string" | "text" => Ok(FieldType::String),
            "int" | "int32" | "int64" | "integer" => Ok(FieldType::Int),
            "float" | "double" | "real" => Ok(FieldType::Float),
            "bool" | "boolean" => Ok(FieldType::Bool),
            "date" => Ok(FieldType::Date),
            "datetime" | "timestamp" => Ok(FieldType::DateTime),
            _ => Err(DatasetError::UnknownKind {
                kind: "field type",
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Geometry subtype shared by all features of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    #[default]
    Unknown,
}

impl GeometryKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::Unknown => "Unknown",
        }
    }

    /// Kind of a concrete geometry. Collections, rectangles and other
    /// non-simple-feature shapes report `Unknown`.
    #[must_use]
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
            _ => GeometryKind::Unknown,
        }
    }

    /// The multi-part counterpart of a single-part kind.
    #[must_use]
    pub fn multi(&self) -> Option<GeometryKind> {
        match self {
            GeometryKind::Point => Some(GeometryKind::MultiPoint),
            GeometryKind::LineString => Some(GeometryKind::MultiLineString),
            GeometryKind::Polygon => Some(GeometryKind::MultiPolygon),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, GeometryKind::Unknown)
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryKind {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "point" => Ok(GeometryKind::Point),
            "linestring" => Ok(GeometryKind::LineString),
            "polygon" => Ok(GeometryKind::Polygon),
            "multipoint" => Ok(GeometryKind::MultiPoint),
            "multilinestring" => Ok(GeometryKind::MultiLineString),
            "multipolygon" => Ok(GeometryKind::MultiPolygon),
            "unknown" | "geometry" | "none" | "" => Ok(GeometryKind::Unknown),
            _ => Err(DatasetError::UnknownKind {
                kind: "geometry kind",
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for GeometryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GeometryKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Opaque coordinate reference system identifier (authority code or WKT).
///
/// Only equality is meaningful to the fusion core; interpretation is left to
/// the reprojection collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, typed attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Structural description of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    geometry_kind: GeometryKind,
    fields: Vec<FieldDef>,
    crs: Option<Crs>,
}

impl Schema {
    /// Builds a schema from an ordered field list.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::DuplicateField`] if two fields share a name.
    pub fn new<I, S>(geometry_kind: GeometryKind, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let mut defs: Vec<FieldDef> = Vec::new();
        for (name, field_type) in fields {
            let name = name.into();
            if defs.iter().any(|f| f.name == name) {
                return Err(DatasetError::DuplicateField { name });
            }
            defs.push(FieldDef { name, field_type });
        }
        Ok(Self {
            geometry_kind,
            fields: defs,
            crs: None,
        })
    }

    /// Builds a schema where a repeated field name keeps the position of its
    /// first occurrence and the type of its last one.
    pub fn last_write_wins<I, S>(geometry_kind: GeometryKind, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let mut defs: Vec<FieldDef> = Vec::new();
        for (name, field_type) in fields {
            let name = name.into();
            match defs.iter_mut().find(|f| f.name == name) {
                Some(existing) => existing.field_type = field_type,
                None => defs.push(FieldDef { name, field_type }),
            }
        }
        Self {
            geometry_kind,
            fields: defs,
            crs: None,
        }
    }

    /// Returns a copy of this schema tagged with `crs`.
    #[must_use]
    pub fn with_crs(mut self, crs: Option<Crs>) -> Self {
        self.crs = crs;
        self
    }

    /// Returns a copy of this schema with a different geometry kind.
    #[must_use]
    pub fn with_geometry_kind(mut self, geometry_kind: GeometryKind) -> Self {
        self.geometry_kind = geometry_kind;
        self
    }

    #[must_use]
    pub fn geometry_kind(&self) -> GeometryKind {
        self.geometry_kind
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    #[must_use]
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compares two schemas for merge compatibility.
    ///
    /// Compatible iff geometry kinds are equal and both schemas contain the
    /// same field names with identical types. Differences are reported as
    /// geometry first, then `self`'s field issues in `self`'s order, then
    /// fields only present in `other`, in `other`'s order. CRS is not part of
    /// the comparison.
    #[must_use]
    pub fn compare(&self, other: &Schema) -> SchemaComparison {
        let mut differences = Vec::new();

        if self.geometry_kind != other.geometry_kind {
            differences.push(format!(
                "geometry kind differs: {} vs {}",
                self.geometry_kind, other.geometry_kind
            ));
        }

        for field in &self.fields {
            match other.field_type(&field.name) {
                None => differences.push(format!(
                    "field '{}' is missing from the second schema",
                    field.name
                )),
                Some(other_type) if other_type != field.field_type => {
                    differences.push(format!(
                        "field '{}' has mismatched types: {} vs {}",
                        field.name, field.field_type, other_type
                    ));
                },
                Some(_) => {},
            }
        }

        for field in &other.fields {
            if !self.contains(&field.name) {
                differences.push(format!(
                    "field '{}' is missing from the first schema",
                    field.name
                ));
            }
        }

        SchemaComparison {
            compatible: differences.is_empty(),
            differences,
        }
    }
}

/// Outcome of [`Schema::compare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaComparison {
    pub compatible: bool,
    pub differences: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(fields: &[(&str, FieldType)]) -> Schema {
        Schema::new(GeometryKind::Point, fields.iter().copied()).unwrap()
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let err = Schema::new(
            GeometryKind::Point,
            [("id", FieldType::Int), ("id", FieldType::String)],
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateField { ref name } if name == "id"));
    }

    #[test]
    fn last_write_wins_keeps_first_position() {
        let schema = Schema::last_write_wins(
            GeometryKind::Point,
            [
                ("a", FieldType::Int),
                ("b", FieldType::String),
                ("a", FieldType::Float),
            ],
        );
        let fields: Vec<(&str, FieldType)> = schema
            .fields()
            .iter()
            .map(|f| (f.name.as_str(), f.field_type))
            .collect();
        assert_eq!(fields, vec![("a", FieldType::Float), ("b", FieldType::String)]);
    }

    #[test]
    fn identical_schemas_are_compatible() {
        let a = points(&[("id", FieldType::Int), ("name", FieldType::String)]);
        let b = a.clone().with_crs(Some(Crs::new("EPSG:3857")));
        let cmp = a.compare(&b);
        assert!(cmp.compatible);
        assert!(cmp.differences.is_empty());
    }

    #[test]
    fn differences_follow_first_then_second_order() {
        let a = points(&[
            ("id", FieldType::Int),
            ("x", FieldType::Int),
            ("only_a", FieldType::Float),
        ]);
        let b = points(&[
            ("only_b", FieldType::Bool),
            ("x", FieldType::String),
            ("id", FieldType::Int),
        ]);

        let cmp = a.compare(&b);
        assert!(!cmp.compatible);
        assert_eq!(
            cmp.differences,
            vec![
                "field 'x' has mismatched types: int vs str".to_string(),
                "field 'only_a' is missing from the second schema".to_string(),
                "field 'only_b' is missing from the first schema".to_string(),
            ]
        );
    }

    #[test]
    fn compatibility_is_symmetric() {
        let a = points(&[("id", FieldType::Int), ("x", FieldType::Int)]);
        let b = points(&[("x", FieldType::String), ("id", FieldType::Int)]);
        let c = points(&[("x", FieldType::Int), ("id", FieldType::Int)]);
        let line = Schema::new(GeometryKind::LineString, [("id", FieldType::Int)]).unwrap();

        for (left, right) in [(&a, &b), (&a, &c), (&b, &c), (&a, &line)] {
            let forward = left.compare(right);
            let backward = right.compare(left);
            assert_eq!(forward.compatible, backward.compatible);
            assert_eq!(forward.differences.is_empty(), forward.compatible);
            assert_eq!(backward.differences.is_empty(), backward.compatible);
        }
        assert!(a.compare(&c).compatible);
    }

    #[test]
    fn geometry_mismatch_is_reported_first() {
        let a = points(&[("id", FieldType::Int)]);
        let b = Schema::new(GeometryKind::Polygon, [("id", FieldType::String)]).unwrap();
        let cmp = a.compare(&b);
        assert_eq!(cmp.differences.len(), 2);
        assert_eq!(cmp.differences[0], "geometry kind differs: Point vs Polygon");
    }

    #[test]
    fn field_type_parses_aliases() {
        assert_eq!("string".parse::<FieldType>().unwrap(), FieldType::String);
        assert_eq!("INT64".parse::<FieldType>().unwrap(), FieldType::Int);
        assert_eq!("double".parse::<FieldType>().unwrap(), FieldType::Float);
        assert_eq!("boolean".parse::<FieldType>().unwrap(), FieldType::Bool);
        assert!("blob".parse::<FieldType>().is_err());
    }

    #[test]
    fn geometry_kind_of_geometry() {
        let point = Geometry::Point(geo_types::Point::new(1.0, 2.0));
        assert_eq!(GeometryKind::of(&point), GeometryKind::Point);
        assert_eq!(GeometryKind::Point.multi(), Some(GeometryKind::MultiPoint));
        assert_eq!(GeometryKind::MultiPoint.multi(), None);
        assert_eq!(
            "multipolygon".parse::<GeometryKind>().unwrap(),
            GeometryKind::MultiPolygon
        );
    }
}
