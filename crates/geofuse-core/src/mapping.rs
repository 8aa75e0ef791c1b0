//! Field mappings: per-field plans for reshaping features of one schema into
//! another.

use geofuse_core_common::{FieldType, Value};

/// How a source value becomes a target value.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Copy the value unchanged.
    Direct,
    /// Coerce the value with [`convert`](crate::conversion::convert).
    TypeConvert {
        source_type: Option<FieldType>,
        target_type: FieldType,
    },
    /// The target has no such field; copy the value and declare `field_type`.
    NewField { field_type: FieldType },
    /// Run a named strategy from the
    /// [`ConversionRegistry`](crate::registry::ConversionRegistry).
    Custom {
        function: String,
        field_type: FieldType,
    },
}

impl Conversion {
    /// Name used in mapping documents.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Conversion::Direct => "direct",
            Conversion::TypeConvert { .. } => "type_convert",
            Conversion::NewField { .. } => "new_field",
            Conversion::Custom { .. } => "custom",
        }
    }
}

/// One source field's plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub source_field: String,
    pub target_field: String,
    pub conversion: Conversion,
    /// Used when conversion fails or the value is null under `TypeConvert`.
    pub default_value: Value,
}

impl MappingEntry {
    /// A `Direct` entry targeting a field of the same name.
    pub fn direct(source_field: impl Into<String>) -> Self {
        let source_field = source_field.into();
        Self {
            target_field: source_field.clone(),
            source_field,
            conversion: Conversion::Direct,
            default_value: Value::Null,
        }
    }

    pub fn type_convert(
        source_field: impl Into<String>,
        source_type: Option<FieldType>,
        target_type: FieldType,
    ) -> Self {
        Self::direct(source_field).with_conversion(Conversion::TypeConvert {
            source_type,
            target_type,
        })
    }

    pub fn new_field(source_field: impl Into<String>, field_type: FieldType) -> Self {
        Self::direct(source_field).with_conversion(Conversion::NewField { field_type })
    }

    pub fn custom(
        source_field: impl Into<String>,
        function: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self::direct(source_field).with_conversion(Conversion::Custom {
            function: function.into(),
            field_type,
        })
    }

    #[must_use]
    pub fn with_target(mut self, target_field: impl Into<String>) -> Self {
        self.target_field = target_field.into();
        self
    }

    #[must_use]
    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default_value: impl Into<Value>) -> Self {
        self.default_value = default_value.into();
        self
    }
}

/// Entries keyed uniquely by source field, kept in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<MappingEntry>,
}

impl Mapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, or replaces the entry for the same source field in
    /// place. Returns the replaced entry.
    pub fn insert(&mut self, entry: MappingEntry) -> Option<MappingEntry> {
        match self
            .entries
            .iter_mut()
            .find(|e| e.source_field == entry.source_field)
        {
            Some(existing) => Some(std::mem::replace(existing, entry)),
            None => {
                self.entries.push(entry);
                None
            },
        }
    }

    /// Removes and returns the entry for `source_field`.
    pub fn remove(&mut self, source_field: &str) -> Option<MappingEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.source_field == source_field)?;
        Some(self.entries.remove(index))
    }

    #[must_use]
    pub fn get(&self, source_field: &str) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.source_field == source_field)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MappingEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<MappingEntry> for Mapping {
    fn from_iter<I: IntoIterator<Item = MappingEntry>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for entry in iter {
            mapping.insert(entry);
        }
        mapping
    }
}

impl<'a> IntoIterator for &'a Mapping {
    type Item = &'a MappingEntry;
    type IntoIter = std::slice::Iter<'a, MappingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
