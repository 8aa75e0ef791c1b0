//! `geofuse-core` reconciles the schemas of vector layers and fuses layers
//! from several datasets into one output dataset.
//!
//! This crate includes:
//! - **Type conversion**: the lenient value coercion policy and geometry
//!   kind promotion ([`conversion`]).
//! - **Field mapping**: mapping inference, target schema derivation and
//!   feature reshaping ([`mapper`], [`mapping`]), custom conversion
//!   strategies ([`registry`]), JSON mapping documents ([`document`]) and
//!   mapping validation ([`validation`]).
//! - **Fusion**: homogeneous and heterogeneous merges and mapping template
//!   generation ([`fusion`], [`template`]).
//! - **Reprojection**: the [`Reprojector`] trait and a built-in WGS 84 / Web
//!   Mercator implementation ([`reproject`]).
//!
//! Datasets are reached through the reader and writer traits of
//! `geofuse-core-common`; this crate never touches a container format
//! directly.

pub mod config;
pub mod conversion;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod fusion;
pub mod mapper;
pub mod mapping;
pub mod registry;
pub mod reproject;
pub mod template;
pub mod validation;

pub use config::{FusionConfig, GeometryPolicy};
pub use conversion::{ConversionFailure, convert, convert_geometry_kind};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use document::{MappingDocument, load_mapping, save_mapping};
pub use error::{ConfigError, FusionError, MappingIoError, ReprojectError};
pub use fusion::{
    DifferentSchemaRequest, FusionEngine, LayerSummary, MappingSource, MergeSummary,
    SameSchemaRequest,
};
pub use mapper::{FieldMapper, derive_target_schema, infer_mapping};
pub use mapping::{Conversion, Mapping, MappingEntry};
pub use registry::ConversionRegistry;
pub use reproject::{Reprojector, WebMercator};
pub use validation::{MappingValidation, validate_mapping};
