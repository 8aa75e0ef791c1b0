//! Schema reconciliation and feature reshaping.

use geofuse_core_common::{Feature, FieldType, Schema, Value};

use crate::conversion::convert;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::mapping::{Conversion, Mapping, MappingEntry};
use crate::registry::ConversionRegistry;

/// Builds a mapping with one entry per field of `source`, in `source`
/// order. Fields are matched by name: same type maps `Direct`, a different
/// type maps `TypeConvert`, and a field `target` lacks maps `NewField`.
#[must_use]
pub fn infer_mapping(source: &Schema, target: &Schema) -> Mapping {
    source
        .fields()
        .iter()
        .map(|field| match target.field_type(&field.name) {
            Some(target_type) if target_type == field.field_type => {
                MappingEntry::direct(&field.name)
            },
            Some(target_type) => {
                MappingEntry::type_convert(&field.name, Some(field.field_type), target_type)
            },
            None => MappingEntry::new_field(&field.name, field.field_type),
        })
        .collect()
}

/// The schema produced by applying `mapping` to features of `source`.
///
/// Entries whose source field is not in `source` contribute nothing. When
/// two entries target the same field, the later entry decides its type and
/// the field keeps the position of the first.
#[must_use]
pub fn derive_target_schema(mapping: &Mapping, source: &Schema) -> Schema {
    let fields = mapping.iter().filter_map(|entry| {
        let source_type = source.field_type(&entry.source_field)?;
        Some((entry.target_field.as_str(), target_type(entry, source_type)))
    });
    Schema::last_write_wins(source.geometry_kind(), fields).with_crs(source.crs().cloned())
}

fn target_type(entry: &MappingEntry, source_type: FieldType) -> FieldType {
    match &entry.conversion {
        Conversion::Direct => source_type,
        Conversion::TypeConvert { target_type, .. } => *target_type,
        Conversion::NewField { field_type } | Conversion::Custom { field_type, .. } => *field_type,
    }
}

/// Applies mappings to features, resolving `custom` entries against a
/// [`ConversionRegistry`].
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    registry: ConversionRegistry,
}

impl FieldMapper {
    /// A mapper with the built-in custom strategies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_registry(registry: ConversionRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &ConversionRegistry {
        &self.registry
    }

    /// Reshapes `feature` according to `mapping`.
    ///
    /// The geometry is kept as is. Entries whose source field is absent from
    /// the feature produce no property and a diagnostic. Failed conversions
    /// resolve to the entry's default; nothing here fails the caller.
    pub fn apply(&self, mapping: &Mapping, feature: &Feature, diagnostics: &mut Diagnostics) -> Feature {
        let mut output = Feature::new(feature.geometry.clone());
        for entry in mapping {
            let Some(value) = feature.properties.get(&entry.source_field) else {
                diagnostics.warn(
                    DiagnosticKind::MissingSourceField,
                    format!("source field '{}' missing from feature", entry.source_field),
                );
                continue;
            };
            let converted = self.apply_entry(entry, value, diagnostics);
            output.properties.insert(entry.target_field.clone(), converted);
        }
        output
    }

    fn apply_entry(&self, entry: &MappingEntry, value: &Value, diagnostics: &mut Diagnostics) -> Value {
        match &entry.conversion {
            Conversion::Direct | Conversion::NewField { .. } => value.clone(),
            Conversion::TypeConvert { target_type, .. } => {
                if value.is_null() {
                    return entry.default_value.clone();
                }
                convert(value, *target_type).unwrap_or_else(|failure| {
                    diagnostics.info(
                        DiagnosticKind::ConversionFallback,
                        format!(
                            "field '{}' fell back to its default: {}",
                            entry.source_field, failure.reason
                        ),
                    );
                    entry.default_value.clone()
                })
            },
            Conversion::Custom { function, .. } => {
                let Some(strategy) = self.registry.get(function) else {
                    diagnostics.warn(
                        DiagnosticKind::CustomConversionFailed,
                        format!("custom conversion '{function}' is not registered"),
                    );
                    return entry.default_value.clone();
                };
                strategy(value).unwrap_or_else(|failure| {
                    diagnostics.warn(
                        DiagnosticKind::CustomConversionFailed,
                        format!(
                            "custom conversion '{function}' failed on field '{}': {}",
                            entry.source_field, failure.reason
                        ),
                    );
                    entry.default_value.clone()
                })
            },
        }
    }
}
