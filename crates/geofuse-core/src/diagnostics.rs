//! Structured record of everything a merge skipped or worked around.
//!
//! Every engine call takes a [`Diagnostics`] sink. Records are also logged
//! through the `log` facade as they are pushed; repeats of an identical
//! record are folded into one with an occurrence count.

use std::fmt;

use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
        })
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A non-required dataset could not be opened.
    DatasetUnreadable,
    /// A layer is missing from a dataset.
    LayerAbsent,
    /// Schemas or geometry kinds could not be reconciled.
    SchemaIncompatible,
    /// Layer data or a single feature could not be read.
    ReadFailed,
    /// The output rejected a layer or a batch.
    WriteFailed,
    /// Geometry could not be reprojected.
    ReprojectFailed,
    /// One side of a merge has no CRS, so no reprojection was attempted.
    CrsUnknown,
    /// A feature lacked a field named by the mapping.
    MissingSourceField,
    /// A value fell back to the entry default.
    ConversionFallback,
    /// A custom strategy failed or is not registered.
    CustomConversionFailed,
    /// A feature geometry could not be brought to the layer's kind.
    GeometryConversionFailed,
    /// The supplied mapping could not be used; inference took over.
    MappingUnavailable,
}

impl DiagnosticKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::DatasetUnreadable => "dataset-unreadable",
            DiagnosticKind::LayerAbsent => "layer-absent",
            DiagnosticKind::SchemaIncompatible => "schema-incompatible",
            DiagnosticKind::ReadFailed => "read-failed",
            DiagnosticKind::WriteFailed => "write-failed",
            DiagnosticKind::ReprojectFailed => "reproject-failed",
            DiagnosticKind::CrsUnknown => "crs-unknown",
            DiagnosticKind::MissingSourceField => "missing-source-field",
            DiagnosticKind::ConversionFallback => "conversion-fallback",
            DiagnosticKind::CustomConversionFailed => "custom-conversion-failed",
            DiagnosticKind::GeometryConversionFailed => "geometry-conversion-failed",
            DiagnosticKind::MappingUnavailable => "mapping-unavailable",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub dataset: Option<String>,
    pub layer: Option<String>,
    pub message: String,
    /// How many times this exact record was pushed.
    pub occurrences: usize,
}

impl Diagnostic {
    fn same_event(&self, other: &Diagnostic) -> bool {
        self.severity == other.severity
            && self.kind == other.kind
            && self.dataset == other.dataset
            && self.layer == other.layer
            && self.message == other.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.dataset, &self.layer) {
            (Some(dataset), Some(layer)) => write!(f, "[{dataset}/{layer}] ")?,
            (Some(dataset), None) => write!(f, "[{dataset}] ")?,
            (None, Some(layer)) => write!(f, "[{layer}] ")?,
            (None, None) => {},
        }
        write!(f, "{}", self.message)?;
        if self.occurrences > 1 {
            write!(f, " (x{})", self.occurrences)?;
        }
        Ok(())
    }
}

/// Accumulating diagnostics sink.
///
/// The sink carries a current scope (dataset and layer) that is attached to
/// each pushed record, so lower layers such as the field mapper can report
/// without knowing where they were called from.
#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
    dataset: Option<String>,
    layer: Option<String>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scope attached to subsequent records.
    pub fn enter(&mut self, dataset: Option<&str>, layer: Option<&str>) {
        self.dataset = dataset.map(str::to_string);
        self.layer = layer.map(str::to_string);
    }

    pub fn info(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Severity::Info, kind, message.into());
    }

    pub fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Severity::Warning, kind, message.into());
    }

    fn push(&mut self, severity: Severity, kind: DiagnosticKind, message: String) {
        let record = Diagnostic {
            severity,
            kind,
            dataset: self.dataset.clone(),
            layer: self.layer.clone(),
            message,
            occurrences: 1,
        };

        if let Some(existing) = self.records.iter_mut().find(|r| r.same_event(&record)) {
            existing.occurrences += 1;
            debug!("{record}");
            return;
        }
        match severity {
            Severity::Info => info!("{record}"),
            Severity::Warning => warn!("{record}"),
        }
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Records of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.severity == Severity::Warning)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
