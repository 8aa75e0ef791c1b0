//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting merge results, diagnostics and dataset layouts.

use tabled::{Table, Tabled};

use geofuse_core::{Diagnostic, MergeSummary};
use geofuse_core_common::Schema;

/// One layer of an inspected dataset.
pub struct LayerInfo {
    pub name: String,
    pub schema: Schema,
    /// `None` when the features could not be read.
    pub feature_count: Option<usize>,
}

/// Table row representation for displaying layer information.
#[derive(Tabled)]
pub struct LayerRow {
    #[tabled(rename = "Layer")]
    pub name: String,
    #[tabled(rename = "Geometry")]
    pub geometry: String,
    /// Coordinate Reference System, or `N/A`.
    #[tabled(rename = "CRS")]
    pub crs: String,
    #[tabled(rename = "Fields")]
    pub fields: usize,
    #[tabled(rename = "Features")]
    pub features: String,
}

/// Table row representation for displaying field information.
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub data_type: String,
}

/// Table row representation for one output layer of a merge.
#[derive(Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Layer")]
    pub layer: String,
    #[tabled(rename = "Features")]
    pub features: usize,
    /// Contributing datasets, in write order.
    #[tabled(rename = "Sources")]
    pub sources: String,
}

/// Table row representation for one diagnostic record.
#[derive(Tabled)]
pub struct DiagnosticRow {
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Dataset")]
    pub dataset: String,
    #[tabled(rename = "Layer")]
    pub layer: String,
    #[tabled(rename = "Message")]
    pub message: String,
    #[tabled(rename = "Count")]
    pub occurrences: usize,
}

impl From<&Diagnostic> for DiagnosticRow {
    fn from(d: &Diagnostic) -> Self {
        Self {
            severity: d.severity.to_string(),
            kind: d.kind.to_string(),
            dataset: d.dataset.clone().unwrap_or_else(|| "-".to_string()),
            layer: d.layer.clone().unwrap_or_else(|| "-".to_string()),
            message: d.message.clone(),
            occurrences: d.occurrences,
        }
    }
}

/// Display the layers of a dataset, followed by one field table per layer.
pub fn display_dataset_info(dataset: &str, layers: &[LayerInfo]) {
    println!("\nDataset: {dataset}");

    if layers.is_empty() {
        println!("No layers found.");
        return;
    }

    println!("\n=== Layers ===");
    let rows: Vec<LayerRow> = layers
        .iter()
        .map(|l| LayerRow {
            name: l.name.clone(),
            geometry: l.schema.geometry_kind().to_string(),
            crs: l
                .schema
                .crs()
                .map_or_else(|| "N/A".to_string(), ToString::to_string),
            fields: l.schema.len(),
            features: l
                .feature_count
                .map_or_else(|| "unreadable".to_string(), |n| n.to_string()),
        })
        .collect();
    println!("{}", Table::new(rows));

    for layer in layers.iter().filter(|l| !l.schema.is_empty()) {
        println!("\n=== Fields of {} ===", layer.name);
        let rows: Vec<FieldRow> = layer
            .schema
            .fields()
            .iter()
            .map(|f| FieldRow {
                name: f.name.clone(),
                data_type: f.field_type.to_string(),
            })
            .collect();
        println!("{}", Table::new(rows));
    }
}

/// Display what a merge wrote.
pub fn display_summary(output: &str, summary: &MergeSummary) {
    println!(
        "\nWrote {} feature(s) in {} layer(s) to {output}",
        summary.total_features(),
        summary.layers.len()
    );
    if summary.layers.is_empty() {
        return;
    }

    let rows: Vec<SummaryRow> = summary
        .layers
        .iter()
        .map(|l| SummaryRow {
            layer: l.name.clone(),
            features: l.features_written,
            sources: l.sources.join(", "),
        })
        .collect();
    println!("{}", Table::new(rows));
}

/// Display diagnostics, if any.
pub fn display_diagnostics(records: &[Diagnostic]) {
    if records.is_empty() {
        return;
    }
    println!("\n=== Diagnostics ===");
    let rows: Vec<DiagnosticRow> = records.iter().map(DiagnosticRow::from).collect();
    println!("{}", Table::new(rows));
}
