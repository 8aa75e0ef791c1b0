//! I/O traits for reading and writing layered geospatial datasets.
//!
//! This module defines the collaborator contracts that container formats
//! implement. Handles are closed by dropping them; an [`OutputDataset`] that
//! is dropped before [`OutputDataset::finalize`] finalizes itself.

use crate::error::Result;
use crate::schema::{Crs, Schema};
use crate::value::Feature;

/// Lazy, finite sequence of features read from one layer.
///
/// Restarting the sequence means calling [`Dataset::features`] again.
pub type FeatureStream<'a> = Box<dyn Iterator<Item = Result<Feature>> + 'a>;

/// Opens datasets by identifier.
pub trait DatasetReader: Send + Sync {
    /// Opens a dataset for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset does not exist or cannot be decoded.
    fn open(&self, identifier: &str) -> Result<Box<dyn Dataset>>;
}

/// A readable dataset handle.
pub trait Dataset {
    /// Identifier this handle was opened with.
    fn identifier(&self) -> &str;

    /// Layer names in enumeration order.
    fn layer_names(&self) -> Vec<String>;

    /// Structural metadata of a layer, including its CRS.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is absent or its metadata is unreadable.
    fn schema(&self, layer: &str) -> Result<Schema>;

    /// Streams the features of a layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is absent or its data is unreadable.
    fn features(&self, layer: &str) -> Result<FeatureStream<'_>>;

    /// CRS of a layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is absent.
    fn crs(&self, layer: &str) -> Result<Option<Crs>> {
        Ok(self.schema(layer)?.crs().cloned())
    }

    fn has_layer(&self, layer: &str) -> bool {
        self.layer_names().iter().any(|name| name == layer)
    }
}

/// Creates output datasets.
pub trait DatasetWriter: Send + Sync {
    /// Creates (or overwrites) an output dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be created.
    fn create(&self, target: &str) -> Result<Box<dyn OutputDataset>>;
}

/// An exclusive-write output dataset handle.
///
/// Features written before [`finalize`](OutputDataset::finalize) may only be
/// buffered; finalizing performs the durable write.
pub trait OutputDataset {
    /// Target this handle writes to.
    fn target(&self) -> &str;

    /// Creates a layer with the given schema; the layer CRS is `schema.crs()`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::LayerExists`](crate::DatasetError::LayerExists)
    /// if the layer was already created.
    fn create_layer(&mut self, name: &str, schema: &Schema) -> Result<()>;

    /// Appends a batch of features to a previously created layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer does not exist or the dataset is finalized.
    fn write_features(&mut self, layer: &str, features: Vec<Feature>) -> Result<()>;

    /// Durably writes everything buffered so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn finalize(&mut self) -> Result<()>;

    fn is_finalized(&self) -> bool;
}
