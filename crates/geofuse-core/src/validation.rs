//! Static checks of a mapping against the schemas it will be applied to.

use geofuse_core_common::Schema;

use crate::mapping::{Conversion, Mapping};
use crate::registry::ConversionRegistry;

/// Result of [`validate_mapping`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MappingValidation {
    pub errors: Vec<String>,
}

impl MappingValidation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks that every entry of `mapping` can be applied to features of
/// `source` and lands on a compatible field of `target`.
///
/// - the source field must exist in `source`;
/// - `direct` needs the target field to exist with the source field's type;
/// - `type_convert` needs the target field to exist with the target type;
/// - `new_field` is always accepted;
/// - `custom` needs its strategy to be registered.
///
/// An empty mapping is invalid.
#[must_use]
pub fn validate_mapping(
    mapping: &Mapping,
    source: &Schema,
    target: &Schema,
    registry: &ConversionRegistry,
) -> MappingValidation {
    let mut errors = Vec::new();
    if mapping.is_empty() {
        errors.push("mapping is empty".to_string());
    }

    for entry in mapping {
        let Some(source_type) = source.field_type(&entry.source_field) else {
            errors.push(format!(
                "source field '{}' does not exist in the source schema",
                entry.source_field
            ));
            continue;
        };
        let target_type = target.field_type(&entry.target_field);

        match &entry.conversion {
            Conversion::Direct => match target_type {
                None => errors.push(format!(
                    "target field '{}' does not exist in the target schema",
                    entry.target_field
                )),
                Some(t) if t != source_type => errors.push(format!(
                    "direct mapping '{}' -> '{}' changes type from {source_type} to {t}",
                    entry.source_field, entry.target_field
                )),
                Some(_) => {},
            },
            Conversion::TypeConvert {
                target_type: wanted,
                ..
            } => match target_type {
                None => errors.push(format!(
                    "target field '{}' does not exist in the target schema",
                    entry.target_field
                )),
                Some(t) if t != *wanted => errors.push(format!(
                    "target field '{}' is {t}, not {wanted}",
                    entry.target_field
                )),
                Some(_) => {},
            },
            Conversion::NewField { .. } => {},
            Conversion::Custom { function, .. } => {
                if !registry.contains(function) {
                    errors.push(format!(
                        "custom conversion '{function}' for '{}' is not registered",
                        entry.source_field
                    ));
                }
            },
        }
    }

    MappingValidation { errors }
}
