//! Common types and traits shared across `geofuse` crates.
//!
//! This crate provides the data model (schemas, values, features) and the
//! dataset reader/writer abstractions shared between `geofuse-core` and the
//! format crates, preventing circular dependencies.

pub mod error;
pub mod io;
pub mod memory;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use error::{DatasetError, Result};
pub use io::{Dataset, DatasetReader, DatasetWriter, FeatureStream, OutputDataset};
pub use memory::MemoryCatalog;
pub use schema::{Crs, FieldDef, FieldType, GeometryKind, Schema, SchemaComparison};
pub use value::{Feature, Value};
