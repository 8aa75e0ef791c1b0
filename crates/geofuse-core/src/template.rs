//! Mapping template generation.

use std::path::Path;

use geofuse_core_common::Schema;
use log::info;

use crate::document::save_mapping;
use crate::error::FusionError;
use crate::fusion::FusionEngine;
use crate::mapper::infer_mapping;
use crate::mapping::Mapping;

impl FusionEngine<'_> {
    /// Reads the schema of one layer from each dataset, infers the mapping
    /// from the secondary layer onto the primary layer and saves it to
    /// `output` for hand editing.
    ///
    /// # Errors
    ///
    /// Fails if either dataset cannot be opened, the layer is absent from
    /// either, or the document cannot be written.
    pub fn generate_mapping_template(
        &self,
        primary: &str,
        secondary: &str,
        layer: &str,
        output: &Path,
    ) -> Result<Mapping, FusionError> {
        let primary_schema = self.layer_schema(primary, layer)?;
        let secondary_schema = self.layer_schema(secondary, layer)?;

        let mapping = infer_mapping(&secondary_schema, &primary_schema);
        save_mapping(&mapping, output)?;
        info!(
            "Wrote mapping template for {layer} with {} field(s) to {}",
            mapping.len(),
            output.display()
        );
        Ok(mapping)
    }

    /// Schema of `layer` in `dataset`. The dataset is closed on return.
    ///
    /// # Errors
    ///
    /// Fails if the dataset cannot be opened or does not hold `layer`.
    pub fn layer_schema(&self, dataset: &str, layer: &str) -> Result<Schema, FusionError> {
        let handle = self.open_required(dataset)?;
        if !handle.has_layer(layer) {
            return Err(FusionError::LayerAbsent {
                dataset: dataset.to_string(),
                layer: layer.to_string(),
            });
        }
        handle
            .schema(layer)
            .map_err(|source| FusionError::DatasetUnreadable {
                dataset: dataset.to_string(),
                source,
            })
    }
}
