//! Errors raised by dataset readers and writers.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by dataset collaborators (readers, writers) and by
/// schema construction.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The dataset could not be opened or does not exist.
    #[error("Cannot open dataset '{identifier}': {reason}")]
    Open {
        /// Dataset identifier or path
        identifier: String,
        /// Why opening failed
        reason: String,
    },

    /// A layer was requested that the dataset does not hold.
    #[error("Layer '{layer}' not found in dataset '{dataset}'")]
    LayerNotFound {
        /// Dataset identifier
        dataset: String,
        /// Requested layer
        layer: String,
    },

    /// A layer was created twice in one output dataset.
    #[error("Layer '{layer}' already exists")]
    LayerExists {
        /// The layer name
        layer: String,
    },

    /// A write was attempted after the output dataset was finalized.
    #[error("Output dataset '{target}' is already finalized")]
    Finalized {
        /// Output target
        target: String,
    },

    /// Two fields with the same name in one schema.
    #[error("Duplicate field '{name}' in schema")]
    DuplicateField {
        /// The duplicated field name
        name: String,
    },

    /// A type or geometry name could not be recognised.
    #[error("Unknown {kind}: '{value}'")]
    UnknownKind {
        /// What was being parsed (e.g. "field type")
        kind: &'static str,
        /// The unrecognised text
        value: String,
    },

    /// Stored data could not be decoded.
    #[error("Failed to parse {context}: {message}")]
    Parse {
        /// What was being parsed
        context: String,
        /// Description of the parse error
        message: String,
    },

    /// Underlying I/O failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Type alias for Results using `DatasetError`.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Extension trait attaching a path to `std::io` failures.
pub trait IoResultExt<T> {
    /// Wrap an I/O error with the path being accessed.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Io`] if the underlying operation fails.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| DatasetError::Io {
            path: path.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_carry_path() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.with_path("/tmp/x.geojson").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/tmp/x.geojson"));
        assert!(message.contains("missing"));
    }
}
