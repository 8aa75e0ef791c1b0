//! The Fusion Engine: merges layers across datasets.
//!
//! Two merge modes are provided:
//!
//! - [`FusionEngine::merge_same_schema`] concatenates identically-shaped
//!   layers from two or more datasets. The first dataset is the base: its
//!   layers define what is written, and every other dataset contributes to
//!   those layers only where its schema is compatible.
//! - [`FusionEngine::merge_different_schema`] merges a secondary dataset into
//!   a primary one, reshaping secondary features through a [`Mapping`].
//!
//! Failures are split in two. Anything that prevents the call from producing
//! output at all is a [`FusionError`]. Anything that only affects one dataset,
//! layer or feature is reported to the [`Diagnostics`] sink and skipped, so a
//! successful call may still have written only part of its inputs.

use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

use geofuse_core_common::{
    Crs, Dataset, DatasetError, DatasetReader, DatasetWriter, Feature, GeometryKind,
    OutputDataset, Schema,
};
use log::{debug, info};

use crate::config::GeometryPolicy;
use crate::conversion::promote_to_multi;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::document::{MappingDocument, load_mapping};
use crate::error::FusionError;
use crate::mapper::{FieldMapper, derive_target_schema, infer_mapping};
use crate::mapping::Mapping;
use crate::reproject::Reprojector;

/// Inputs of a homogeneous merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SameSchemaRequest {
    /// Dataset identifiers; the first is the base.
    pub inputs: Vec<String>,
    pub output: String,
    /// Layer filter; `None` merges every base layer.
    pub layers: Option<Vec<String>>,
}

impl SameSchemaRequest {
    pub fn new<I, S>(inputs: I, output: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
            layers: None,
        }
    }

    #[must_use]
    pub fn with_layers(mut self, layers: Option<Vec<String>>) -> Self {
        self.layers = layers;
        self
    }
}

/// Where a heterogeneous merge gets its mappings from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MappingSource {
    /// Infer a mapping per layer from the two schemas.
    #[default]
    Infer,
    /// Use an already-loaded document.
    Provided(MappingDocument),
    /// Load a document from disk; inference is used if loading fails.
    File(PathBuf),
}

/// Inputs of a heterogeneous merge.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentSchemaRequest {
    pub primary: String,
    pub secondary: String,
    pub output: String,
    pub mapping: MappingSource,
    /// Layer filter; `None` merges every primary layer.
    pub layers: Option<Vec<String>>,
}

impl DifferentSchemaRequest {
    pub fn new(
        primary: impl Into<String>,
        secondary: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
            output: output.into(),
            mapping: MappingSource::Infer,
            layers: None,
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingSource) -> Self {
        self.mapping = mapping;
        self
    }

    #[must_use]
    pub fn with_layers(mut self, layers: Option<Vec<String>>) -> Self {
        self.layers = layers;
        self
    }
}

/// What one output layer received.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LayerSummary {
    pub name: String,
    pub features_written: usize,
    /// Datasets that contributed features, in write order.
    pub sources: Vec<String>,
}

/// Per-layer outcome of a merge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub layers: Vec<LayerSummary>,
}

impl MergeSummary {
    fn record(&mut self, layer: &str, source: &str, count: usize) {
        let index = match self.layers.iter().position(|l| l.name == layer) {
            Some(index) => index,
            None => {
                self.layers.push(LayerSummary {
                    name: layer.to_string(),
                    ..LayerSummary::default()
                });
                self.layers.len() - 1
            },
        };
        let summary = &mut self.layers[index];
        summary.features_written += count;
        summary.sources.push(source.to_string());
    }

    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&LayerSummary> {
        self.layers.iter().find(|l| l.name == name)
    }

    #[must_use]
    pub fn total_features(&self) -> usize {
        self.layers.iter().map(|l| l.features_written).sum()
    }
}

/// A unit of work that was abandoned; reported as a warning.
#[derive(Debug)]
struct LayerSkip {
    kind: DiagnosticKind,
    message: String,
}

impl LayerSkip {
    fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn read_failed(err: DatasetError) -> Self {
        Self::new(DiagnosticKind::ReadFailed, format!("layer skipped, cannot read it: {err}"))
    }

    fn write_failed(err: DatasetError) -> Self {
        Self::new(DiagnosticKind::WriteFailed, format!("layer skipped, cannot write it: {err}"))
    }

    fn report(self, diagnostics: &mut Diagnostics) {
        diagnostics.warn(self.kind, self.message);
    }
}

/// A base layer already written to the output.
struct OpenLayer {
    name: String,
    schema: Schema,
}

/// Merges datasets read through a [`DatasetReader`] into outputs created by
/// a [`DatasetWriter`].
///
/// The engine keeps no state between calls; every handle it opens is closed
/// before the call returns.
pub struct FusionEngine<'a> {
    reader: &'a dyn DatasetReader,
    writer: &'a dyn DatasetWriter,
    reprojector: &'a dyn Reprojector,
    mapper: FieldMapper,
    geometry_policy: GeometryPolicy,
}

impl<'a> FusionEngine<'a> {
    pub fn new(
        reader: &'a dyn DatasetReader,
        writer: &'a dyn DatasetWriter,
        reprojector: &'a dyn Reprojector,
    ) -> Self {
        Self {
            reader,
            writer,
            reprojector,
            mapper: FieldMapper::new(),
            geometry_policy: GeometryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_mapper(mut self, mapper: FieldMapper) -> Self {
        self.mapper = mapper;
        self
    }

    #[must_use]
    pub fn with_geometry_policy(mut self, policy: GeometryPolicy) -> Self {
        self.geometry_policy = policy;
        self
    }

    #[must_use]
    pub fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    /// Concatenates layers of identical schema across datasets.
    ///
    /// Every selected layer of the first dataset is copied to the output.
    /// Each remaining dataset is then opened once and, for every copied
    /// layer, contributes its features if the layer exists and its schema
    /// compares compatible; features in a different CRS are reprojected to
    /// the base CRS first. Anything that cannot contribute is skipped with a
    /// diagnostic.
    ///
    /// # Errors
    ///
    /// Fails with fewer than two inputs, an output that overlaps an input,
    /// an unreadable base dataset, no selected layers, or when the output
    /// cannot be created or finalized.
    pub fn merge_same_schema(
        &self,
        request: &SameSchemaRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<MergeSummary, FusionError> {
        let [base_id, others @ ..] = request.inputs.as_slice() else {
            return Err(FusionError::InsufficientInputs { count: 0 });
        };
        if others.is_empty() {
            return Err(FusionError::InsufficientInputs { count: 1 });
        }
        ensure_distinct_output(&request.output, &request.inputs)?;
        info!(
            "Merging {} datasets with identical schemas into {}",
            request.inputs.len(),
            request.output
        );

        let base = self.open_required(base_id)?;
        let layers = select_layers(base.as_ref(), request.layers.as_deref(), diagnostics)?;
        let mut output = self.create_output(&request.output)?;

        let mut summary = MergeSummary::default();
        let mut open_layers = Vec::with_capacity(layers.len());
        for layer in &layers {
            diagnostics.enter(Some(base_id.as_str()), Some(layer.as_str()));
            match self.copy_layer(base.as_ref(), layer, output.as_mut(), diagnostics) {
                Ok((schema, count)) => {
                    summary.record(layer, base_id, count);
                    open_layers.push(OpenLayer {
                        name: layer.clone(),
                        schema,
                    });
                },
                Err(skip) => skip.report(diagnostics),
            }
        }
        drop(base);

        for dataset_id in others {
            diagnostics.enter(Some(dataset_id.as_str()), None);
            let dataset = match self.reader.open(dataset_id) {
                Ok(dataset) => dataset,
                Err(err) => {
                    diagnostics.warn(
                        DiagnosticKind::DatasetUnreadable,
                        format!("dataset skipped, cannot open it: {err}"),
                    );
                    continue;
                },
            };
            for layer in &open_layers {
                diagnostics.enter(Some(dataset_id.as_str()), Some(layer.name.as_str()));
                match self.append_layer(dataset.as_ref(), layer, output.as_mut(), diagnostics) {
                    Ok(count) => summary.record(&layer.name, dataset_id, count),
                    Err(skip) => skip.report(diagnostics),
                }
            }
        }
        diagnostics.enter(None, None);

        self.finalize(output.as_mut())?;
        info!(
            "Merged {} feature(s) into {} layer(s) of {}",
            summary.total_features(),
            summary.layers.len(),
            request.output
        );
        Ok(summary)
    }

    /// Merges a secondary dataset into a primary one.
    ///
    /// Every selected primary layer is written to the output. Layers absent
    /// from the secondary dataset are copied through unchanged. Shared layers
    /// get the primary features followed by the secondary features, each
    /// reprojected to the primary CRS if needed and reshaped by the layer's
    /// mapping. The output schema is the primary schema extended with any
    /// mapped fields it lacks.
    ///
    /// # Errors
    ///
    /// Fails if the output overlaps either input, either dataset cannot be
    /// opened, no layers are selected, or the output cannot be created or
    /// finalized.
    pub fn merge_different_schema(
        &self,
        request: &DifferentSchemaRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<MergeSummary, FusionError> {
        info!(
            "Merging {} into {} as {}",
            request.secondary, request.primary, request.output
        );
        ensure_distinct_output(&request.output, [&request.primary, &request.secondary])?;

        let primary = self.open_required(&request.primary)?;
        let secondary = self.open_required(&request.secondary)?;
        let layers = select_layers(primary.as_ref(), request.layers.as_deref(), diagnostics)?;

        let document: Option<Cow<'_, MappingDocument>> = match &request.mapping {
            MappingSource::Infer => None,
            MappingSource::Provided(document) => Some(Cow::Borrowed(document)),
            MappingSource::File(path) => match load_mapping(path) {
                Ok(document) => Some(Cow::Owned(document)),
                Err(err) => {
                    diagnostics.warn(
                        DiagnosticKind::MappingUnavailable,
                        format!("{err}; mappings will be inferred"),
                    );
                    None
                },
            },
        };

        let mut output = self.create_output(&request.output)?;
        let mut summary = MergeSummary::default();

        for layer in &layers {
            diagnostics.enter(Some(request.primary.as_str()), Some(layer.as_str()));

            if !secondary.has_layer(layer) {
                diagnostics.info(
                    DiagnosticKind::LayerAbsent,
                    format!("layer not in '{}', copied unchanged", request.secondary),
                );
                match self.copy_layer(primary.as_ref(), layer, output.as_mut(), diagnostics) {
                    Ok((_, count)) => summary.record(layer, &request.primary, count),
                    Err(skip) => skip.report(diagnostics),
                }
                continue;
            }

            let mapping = document.as_deref().and_then(|d| d.for_layer(layer));
            if document.is_some() && mapping.is_none() {
                diagnostics.info(
                    DiagnosticKind::MappingUnavailable,
                    "mapping document has no entry for this layer, inferring one",
                );
            }

            let fused = self.fuse_layer(
                primary.as_ref(),
                secondary.as_ref(),
                layer,
                mapping,
                output.as_mut(),
                diagnostics,
            );
            match fused {
                Ok((primary_count, secondary_count)) => {
                    summary.record(layer, &request.primary, primary_count);
                    summary.record(layer, &request.secondary, secondary_count);
                },
                Err(skip) => skip.report(diagnostics),
            }
        }
        diagnostics.enter(None, None);
        drop(secondary);
        drop(primary);

        self.finalize(output.as_mut())?;
        info!(
            "Merged {} feature(s) into {} layer(s) of {}",
            summary.total_features(),
            summary.layers.len(),
            request.output
        );
        Ok(summary)
    }

    pub(crate) fn open_required(&self, identifier: &str) -> Result<Box<dyn Dataset>, FusionError> {
        self.reader
            .open(identifier)
            .map_err(|source| FusionError::DatasetUnreadable {
                dataset: identifier.to_string(),
                source,
            })
    }

    fn create_output(&self, target: &str) -> Result<Box<dyn OutputDataset>, FusionError> {
        self.writer
            .create(target)
            .map_err(|source| FusionError::OutputCreateFailed {
                target: target.to_string(),
                source,
            })
    }

    fn finalize(&self, output: &mut dyn OutputDataset) -> Result<(), FusionError> {
        output
            .finalize()
            .map_err(|source| FusionError::FinalizeFailed {
                target: output.target().to_string(),
                source,
            })
    }

    /// Copies a layer unchanged. Returns the written schema and count.
    fn copy_layer(
        &self,
        dataset: &dyn Dataset,
        layer: &str,
        output: &mut dyn OutputDataset,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Schema, usize), LayerSkip> {
        let crs = dataset.crs(layer).map_err(LayerSkip::read_failed)?;
        let schema = dataset
            .schema(layer)
            .map_err(LayerSkip::read_failed)?
            .with_crs(crs);
        let features = read_features(dataset, layer, diagnostics)?;
        let count = features.len();

        output
            .create_layer(layer, &schema)
            .map_err(LayerSkip::write_failed)?;
        output
            .write_features(layer, features)
            .map_err(LayerSkip::write_failed)?;
        debug!("Copied {count} feature(s) of {layer} from {}", dataset.identifier());
        Ok((schema, count))
    }

    /// Appends a compatible layer of another dataset to an open base layer.
    fn append_layer(
        &self,
        dataset: &dyn Dataset,
        base: &OpenLayer,
        output: &mut dyn OutputDataset,
        diagnostics: &mut Diagnostics,
    ) -> Result<usize, LayerSkip> {
        if !dataset.has_layer(&base.name) {
            return Err(LayerSkip::new(
                DiagnosticKind::LayerAbsent,
                "layer not present, contribution skipped",
            ));
        }
        let schema = dataset.schema(&base.name).map_err(LayerSkip::read_failed)?;
        let comparison = base.schema.compare(&schema);
        if !comparison.compatible {
            return Err(LayerSkip::new(
                DiagnosticKind::SchemaIncompatible,
                format!(
                    "schema incompatible with the base layer, contribution skipped: {}",
                    comparison.differences.join("; ")
                ),
            ));
        }

        let crs = dataset.crs(&base.name).map_err(LayerSkip::read_failed)?;
        let features = read_features(dataset, &base.name, diagnostics)?;
        let features = self.align_crs(features, crs.as_ref(), base.schema.crs(), diagnostics)?;
        let count = features.len();
        output
            .write_features(&base.name, features)
            .map_err(LayerSkip::write_failed)?;
        debug!("Appended {count} feature(s) of {} from {}", base.name, dataset.identifier());
        Ok(count)
    }

    /// Writes primary and mapped secondary features of a shared layer.
    /// Returns the primary and secondary feature counts.
    fn fuse_layer(
        &self,
        primary: &dyn Dataset,
        secondary: &dyn Dataset,
        layer: &str,
        supplied: Option<&Mapping>,
        output: &mut dyn OutputDataset,
        diagnostics: &mut Diagnostics,
    ) -> Result<(usize, usize), LayerSkip> {
        let primary_schema = primary.schema(layer).map_err(LayerSkip::read_failed)?;
        let primary_crs = primary.crs(layer).map_err(LayerSkip::read_failed)?;
        let secondary_schema = secondary.schema(layer).map_err(LayerSkip::read_failed)?;
        let secondary_crs = secondary.crs(layer).map_err(LayerSkip::read_failed)?;

        let promote_to = self.reconcile_geometry(
            primary_schema.geometry_kind(),
            secondary_schema.geometry_kind(),
        )?;

        let mapping = match supplied {
            Some(mapping) => Cow::Borrowed(mapping),
            None => Cow::Owned(infer_mapping(&secondary_schema, &primary_schema)),
        };
        let derived = derive_target_schema(&mapping, &secondary_schema);
        let schema = extend_schema(&primary_schema, &derived).with_crs(primary_crs.clone());

        let primary_features = read_features(primary, layer, diagnostics)?;

        diagnostics.enter(Some(secondary.identifier()), Some(layer));
        let secondary_features = read_features(secondary, layer, diagnostics)?;
        let secondary_features = self.align_crs(
            secondary_features,
            secondary_crs.as_ref(),
            primary_crs.as_ref(),
            diagnostics,
        )?;
        let converted: Vec<Feature> = secondary_features
            .into_iter()
            .map(|feature| {
                let feature = match promote_to {
                    Some(kind) => promote_feature(feature, kind, diagnostics),
                    None => feature,
                };
                self.mapper.apply(&mapping, &feature, diagnostics)
            })
            .collect();

        let counts = (primary_features.len(), converted.len());
        output
            .create_layer(layer, &schema)
            .map_err(LayerSkip::write_failed)?;
        output
            .write_features(layer, primary_features)
            .map_err(LayerSkip::write_failed)?;
        output
            .write_features(layer, converted)
            .map_err(LayerSkip::write_failed)?;
        debug!(
            "Fused {layer}: {} primary and {} secondary feature(s)",
            counts.0, counts.1
        );
        Ok(counts)
    }

    /// Decides whether secondary geometry can join the primary layer.
    /// Returns the kind to promote secondary geometry to, if any.
    fn reconcile_geometry(
        &self,
        primary: GeometryKind,
        secondary: GeometryKind,
    ) -> Result<Option<GeometryKind>, LayerSkip> {
        if primary == secondary || primary.is_unknown() || secondary.is_unknown() {
            return Ok(None);
        }
        match self.geometry_policy {
            GeometryPolicy::Ignore => Ok(None),
            GeometryPolicy::Promote if secondary.multi() == Some(primary) => Ok(Some(primary)),
            GeometryPolicy::Promote | GeometryPolicy::Strict => Err(LayerSkip::new(
                DiagnosticKind::SchemaIncompatible,
                format!(
                    "secondary geometry kind {secondary} cannot be merged into {primary} \
                     under the {} geometry policy",
                    self.geometry_policy
                ),
            )),
        }
    }

    /// Reprojects features from `from` to `to` when both are known and
    /// differ.
    fn align_crs(
        &self,
        features: Vec<Feature>,
        from: Option<&Crs>,
        to: Option<&Crs>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<Feature>, LayerSkip> {
        match (from, to) {
            (Some(from), Some(to)) if from != to => {
                debug!("Reprojecting {} feature(s) from {from} to {to}", features.len());
                features
                    .into_iter()
                    .map(|feature| self.reprojector.reproject(feature, from, to))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| {
                        LayerSkip::new(
                            DiagnosticKind::ReprojectFailed,
                            format!("layer skipped, cannot reproject it: {err}"),
                        )
                    })
            },
            (Some(_), None) | (None, Some(_)) => {
                diagnostics.info(
                    DiagnosticKind::CrsUnknown,
                    "CRS known on only one side, geometry written without reprojection",
                );
                Ok(features)
            },
            _ => Ok(features),
        }
    }
}

/// Fails when creating `output` would replace or remove one of `inputs`.
///
/// Identifiers that name existing paths are compared after resolution, so
/// `a/.` collides with `a`, as does any output directory holding an input.
fn ensure_distinct_output<'i>(
    output: &str,
    inputs: impl IntoIterator<Item = &'i String>,
) -> Result<(), FusionError> {
    let resolved = fs::canonicalize(output).ok();
    for input in inputs {
        let collides = input == output
            || resolved.as_ref().is_some_and(|out| {
                fs::canonicalize(input).is_ok_and(|path| path.starts_with(out))
            });
        if collides {
            return Err(FusionError::OutputIsInput {
                target: output.to_string(),
                dataset: input.clone(),
            });
        }
    }
    Ok(())
}

/// Applies the optional layer filter, keeping dataset order.
fn select_layers(
    dataset: &dyn Dataset,
    filter: Option<&[String]>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<String>, FusionError> {
    let names = dataset.layer_names();
    let selected: Vec<String> = match filter {
        None => names,
        Some(filter) => {
            diagnostics.enter(Some(dataset.identifier()), None);
            for wanted in filter.iter().filter(|f| !names.contains(*f)) {
                diagnostics.warn(
                    DiagnosticKind::LayerAbsent,
                    format!("requested layer '{wanted}' does not exist"),
                );
            }
            diagnostics.enter(None, None);
            names.into_iter().filter(|n| filter.contains(n)).collect()
        },
    };

    if selected.is_empty() {
        return Err(FusionError::NoLayers {
            dataset: dataset.identifier().to_string(),
            filtered: filter.is_some(),
        });
    }
    Ok(selected)
}

/// Collects a layer's features. Individual unreadable features are skipped
/// with a diagnostic; an unreadable layer fails.
fn read_features(
    dataset: &dyn Dataset,
    layer: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Feature>, LayerSkip> {
    let stream = dataset.features(layer).map_err(LayerSkip::read_failed)?;
    let mut features = Vec::new();
    for item in stream {
        match item {
            Ok(feature) => features.push(feature),
            Err(err) => diagnostics.warn(
                DiagnosticKind::ReadFailed,
                format!("unreadable feature skipped: {err}"),
            ),
        }
    }
    Ok(features)
}

/// The primary schema followed by derived fields it does not already have.
fn extend_schema(primary: &Schema, derived: &Schema) -> Schema {
    let extra = derived
        .fields()
        .iter()
        .filter(|f| !primary.contains(&f.name));
    let fields = primary
        .fields()
        .iter()
        .chain(extra)
        .map(|f| (f.name.as_str(), f.field_type));
    Schema::last_write_wins(primary.geometry_kind(), fields)
}

fn promote_feature(mut feature: Feature, target: GeometryKind, diagnostics: &mut Diagnostics) -> Feature {
    if let Some(geometry) = feature.geometry.take() {
        let kind = GeometryKind::of(&geometry);
        feature.geometry = Some(if kind.multi() == Some(target) {
            promote_to_multi(geometry)
        } else {
            if kind != target {
                diagnostics.warn(
                    DiagnosticKind::GeometryConversionFailed,
                    format!("{kind} geometry kept as is in a {target} layer"),
                );
            }
            geometry
        });
    }
    feature
}
