//! Error types for fusion operations.
//!
//! [`FusionError`] is the fatal taxonomy of a merge or template call: when one
//! of these is returned the call produced no usable result. Recoverable
//! conditions (a skipped layer, an unreadable secondary dataset, a value that
//! would not convert) are never errors; they are recorded in
//! [`Diagnostics`](crate::diagnostics::Diagnostics) instead.

use std::path::PathBuf;

use geofuse_core_common::{Crs, DatasetError};
use thiserror::Error;

/// Fatal failures of a Fusion Engine call.
#[derive(Debug, Error)]
pub enum FusionError {
    /// A homogeneous merge needs at least two inputs.
    #[error("At least 2 input datasets are required, got {count}")]
    InsufficientInputs {
        /// Number of inputs supplied
        count: usize,
    },

    /// The driving dataset has no layers left after filtering.
    #[error("No layers to process in '{dataset}'")]
    NoLayers {
        /// Dataset whose layers were enumerated
        dataset: String,
        /// Whether a layer filter was applied
        filtered: bool,
    },

    /// A required input could not be opened or read.
    #[error("Cannot read dataset '{dataset}': {source}")]
    DatasetUnreadable {
        /// Dataset identifier
        dataset: String,
        /// The collaborator failure
        #[source]
        source: DatasetError,
    },

    /// A layer required by the call is missing.
    #[error("Layer '{layer}' does not exist in '{dataset}'")]
    LayerAbsent {
        /// Dataset identifier
        dataset: String,
        /// Missing layer
        layer: String,
    },

    /// The output target could not be created.
    #[error("Cannot create output '{target}': {source}")]
    OutputCreateFailed {
        /// Output target
        target: String,
        /// The collaborator failure
        #[source]
        source: DatasetError,
    },

    /// The output target would overwrite one of the inputs.
    #[error("Output '{target}' overlaps input '{dataset}'")]
    OutputIsInput {
        /// Output target
        target: String,
        /// The input it collides with
        dataset: String,
    },

    /// Buffered output could not be committed.
    #[error("Cannot finalize output '{target}': {source}")]
    FinalizeFailed {
        /// Output target
        target: String,
        /// The collaborator failure
        #[source]
        source: DatasetError,
    },

    /// Mapping document I/O failed.
    #[error(transparent)]
    Mapping(#[from] MappingIoError),

    /// Settings could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FusionError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientInputs { count } => {
                format!("Merging needs at least two input datasets, but {count} was given.")
            },
            Self::NoLayers {
                dataset,
                filtered: true,
            } => format!("None of the requested layers exist in '{dataset}'."),
            Self::NoLayers {
                dataset,
                filtered: false,
            } => format!("Dataset '{dataset}' does not contain any layers."),
            Self::Mapping(e) => format!("Mapping error: {e}"),
            Self::Config(e) => format!("Configuration error: {e}"),
            _ => self.to_string(),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::InsufficientInputs { .. } => {
                Some("Pass two or more datasets with -i/--inputs.".to_string())
            },
            Self::NoLayers { filtered: true, .. } => Some(
                "Run 'geofuse info <DATASET>' to list layers, then adjust --layers.".to_string(),
            ),
            Self::DatasetUnreadable { .. } | Self::LayerAbsent { .. } => {
                Some("Check that the dataset path is correct and the layer exists.".to_string())
            },
            Self::OutputCreateFailed { .. } | Self::FinalizeFailed { .. } => {
                Some("Check that the output location is writable.".to_string())
            },
            Self::OutputIsInput { .. } => {
                Some("Write to a location that is not one of the inputs.".to_string())
            },
            Self::Mapping(MappingIoError::Malformed { .. } | MappingIoError::InvalidEntry { .. }) => {
                Some("Regenerate a template with 'geofuse gen-mapping' and edit it.".to_string())
            },
            _ => None,
        }
    }
}

/// Failures loading or saving mapping documents.
#[derive(Debug, Error)]
pub enum MappingIoError {
    /// The document does not exist.
    #[error("Mapping file not found: '{path}'")]
    NotFound {
        /// The missing path
        path: PathBuf,
    },

    /// The document could not be read.
    #[error("Failed to read mapping file '{path}': {source}")]
    Read {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The document could not be written.
    #[error("Failed to write mapping file '{path}': {source}")]
    Write {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON or has the wrong shape.
    #[error("Malformed mapping file '{path}': {message}")]
    Malformed {
        /// The file path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// One entry violates the mapping invariants.
    #[error("Invalid mapping entry for '{field}': {reason}")]
    InvalidEntry {
        /// Source field of the entry
        field: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// The settings file could not be read.
    #[error("Failed to read settings file '{path}': {source}")]
    Unreadable {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid.
    #[error("Malformed settings file '{path}': {message}")]
    Malformed {
        /// The file path
        path: PathBuf,
        /// Parser message
        message: String,
    },
}

/// Reprojection failures. The engine treats these as per-layer skips.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReprojectError {
    /// No transform is known between the two reference systems.
    #[error("No transform from {from} to {to}")]
    Unsupported {
        /// Source reference system
        from: Crs,
        /// Target reference system
        to: Crs,
    },

    /// A coordinate fell outside the domain of the transform.
    #[error("Coordinate ({x}, {y}) cannot be projected: {reason}")]
    OutOfDomain {
        /// Easting or longitude
        x: String,
        /// Northing or latitude
        y: String,
        /// Why it was rejected
        reason: String,
    },
}
