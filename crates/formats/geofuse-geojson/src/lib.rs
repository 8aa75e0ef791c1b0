//! `GeoJSON` container backend for `geofuse`.
//!
//! A dataset is a directory holding one `<layer>.geojson` FeatureCollection
//! per layer, or a single `.geojson` file holding one layer named after the
//! file stem. Layer schema and CRS travel as the foreign members `"schema"`
//! and `"crs"`; when `"schema"` is absent it is inferred from the features.

pub mod dataset;
pub mod parser;
pub mod writer;

pub use dataset::{GeoJsonReader, GeoJsonWriter};
pub use parser::{ParsedLayer, parse_layer_bytes};
pub use writer::{GeoJsonWriterOptions, write_layer};
