//! In-memory dataset catalog implementing both reader and writer contracts.
//!
//! Datasets live in a shared catalog keyed by identifier. Output datasets are
//! published into the catalog when finalized, so the same catalog can be used
//! to inspect merge results. The catalog also counts live handles, which makes
//! it possible to assert that every opened dataset was closed.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error};

use crate::error::{DatasetError, Result};
use crate::io::{Dataset, DatasetReader, DatasetWriter, FeatureStream, OutputDataset};
use crate::schema::Schema;
use crate::value::Feature;

#[derive(Debug, Clone)]
struct StoredLayer {
    name: String,
    schema: Schema,
    features: Vec<Feature>,
    unreadable: bool,
}

#[derive(Debug, Default)]
struct CatalogState {
    datasets: BTreeMap<String, Vec<StoredLayer>>,
    open_handles: usize,
    rejected_targets: HashSet<String>,
    failing_finalize: HashSet<String>,
}

/// Shared in-memory store of datasets.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds (or replaces) a layer in a dataset, creating the dataset if needed.
    pub fn insert_layer(&self, dataset: &str, layer: &str, schema: Schema, features: Vec<Feature>) {
        let mut state = self.state();
        let layers = state.datasets.entry(dataset.to_string()).or_default();
        let stored = StoredLayer {
            name: layer.to_string(),
            schema,
            features,
            unreadable: false,
        };
        match layers.iter_mut().find(|l| l.name == layer) {
            Some(existing) => *existing = stored,
            None => layers.push(stored),
        }
    }

    /// Makes reads of a layer's features fail. Its schema stays readable.
    pub fn mark_unreadable(&self, dataset: &str, layer: &str) {
        let mut state = self.state();
        if let Some(stored) = state
            .datasets
            .get_mut(dataset)
            .and_then(|layers| layers.iter_mut().find(|l| l.name == layer))
        {
            stored.unreadable = true;
        }
    }

    /// Makes [`DatasetWriter::create`] fail for `target`.
    pub fn reject_target(&self, target: &str) {
        self.state().rejected_targets.insert(target.to_string());
    }

    /// Makes [`OutputDataset::finalize`] fail for `target`.
    pub fn fail_finalize(&self, target: &str) {
        self.state().failing_finalize.insert(target.to_string());
    }

    #[must_use]
    pub fn contains(&self, dataset: &str) -> bool {
        self.state().datasets.contains_key(dataset)
    }

    #[must_use]
    pub fn layer_names(&self, dataset: &str) -> Option<Vec<String>> {
        self.state()
            .datasets
            .get(dataset)
            .map(|layers| layers.iter().map(|l| l.name.clone()).collect())
    }

    #[must_use]
    pub fn layer_schema(&self, dataset: &str, layer: &str) -> Option<Schema> {
        self.find_layer(dataset, layer).map(|l| l.schema)
    }

    #[must_use]
    pub fn layer_features(&self, dataset: &str, layer: &str) -> Option<Vec<Feature>> {
        self.find_layer(dataset, layer).map(|l| l.features)
    }

    /// Number of dataset handles (readers and writers) not yet dropped.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    fn find_layer(&self, dataset: &str, layer: &str) -> Option<StoredLayer> {
        self.state()
            .datasets
            .get(dataset)
            .and_then(|layers| layers.iter().find(|l| l.name == layer).cloned())
    }
}

impl DatasetReader for MemoryCatalog {
    fn open(&self, identifier: &str) -> Result<Box<dyn Dataset>> {
        let mut state = self.state();
        let layers = state
            .datasets
            .get(identifier)
            .cloned()
            .ok_or_else(|| DatasetError::Open {
                identifier: identifier.to_string(),
                reason: "no such dataset in catalog".to_string(),
            })?;
        state.open_handles += 1;
        debug!("Opened in-memory dataset '{identifier}'");
        Ok(Box::new(MemoryDataset {
            identifier: identifier.to_string(),
            layers,
            catalog: self.clone(),
        }))
    }
}

impl DatasetWriter for MemoryCatalog {
    fn create(&self, target: &str) -> Result<Box<dyn OutputDataset>> {
        let mut state = self.state();
        if state.rejected_targets.contains(target) {
            return Err(DatasetError::Open {
                identifier: target.to_string(),
                reason: "target rejected".to_string(),
            });
        }
        state.datasets.remove(target);
        state.open_handles += 1;
        Ok(Box::new(MemoryOutput {
            target: target.to_string(),
            layers: Vec::new(),
            finalized: false,
            catalog: self.clone(),
        }))
    }
}

struct MemoryDataset {
    identifier: String,
    layers: Vec<StoredLayer>,
    catalog: MemoryCatalog,
}

impl MemoryDataset {
    fn layer(&self, name: &str) -> Result<&StoredLayer> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| DatasetError::LayerNotFound {
                dataset: self.identifier.clone(),
                layer: name.to_string(),
            })
    }
}

impl Dataset for MemoryDataset {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    fn schema(&self, layer: &str) -> Result<Schema> {
        Ok(self.layer(layer)?.schema.clone())
    }

    fn features(&self, layer: &str) -> Result<FeatureStream<'_>> {
        let stored = self.layer(layer)?;
        if stored.unreadable {
            return Err(DatasetError::Parse {
                context: format!("layer '{layer}' of '{}'", self.identifier),
                message: "layer data is unreadable".to_string(),
            });
        }
        Ok(Box::new(stored.features.iter().cloned().map(Ok)))
    }
}

impl Drop for MemoryDataset {
    fn drop(&mut self) {
        let mut state = self.catalog.state();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}

struct MemoryOutput {
    target: String,
    layers: Vec<StoredLayer>,
    finalized: bool,
    catalog: MemoryCatalog,
}

impl OutputDataset for MemoryOutput {
    fn target(&self) -> &str {
        &self.target
    }

    fn create_layer(&mut self, name: &str, schema: &Schema) -> Result<()> {
        if self.finalized {
            return Err(DatasetError::Finalized {
                target: self.target.clone(),
            });
        }
        if self.layers.iter().any(|l| l.name == name) {
            return Err(DatasetError::LayerExists {
                layer: name.to_string(),
            });
        }
        self.layers.push(StoredLayer {
            name: name.to_string(),
            schema: schema.clone(),
            features: Vec::new(),
            unreadable: false,
        });
        Ok(())
    }

    fn write_features(&mut self, layer: &str, features: Vec<Feature>) -> Result<()> {
        if self.finalized {
            return Err(DatasetError::Finalized {
                target: self.target.clone(),
            });
        }
        let stored = self
            .layers
            .iter_mut()
            .find(|l| l.name == layer)
            .ok_or_else(|| DatasetError::LayerNotFound {
                dataset: self.target.clone(),
                layer: layer.to_string(),
            })?;
        stored.features.extend(features);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let mut state = self.catalog.state();
        if state.failing_finalize.contains(&self.target) {
            return Err(DatasetError::Open {
                identifier: self.target.clone(),
                reason: "finalize rejected".to_string(),
            });
        }
        state
            .datasets
            .insert(self.target.clone(), std::mem::take(&mut self.layers));
        self.finalized = true;
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        if !self.finalized
            && let Err(err) = self.finalize()
        {
            error!("Failed to finalize '{}' on close: {err}", self.target);
        }
        let mut state = self.catalog.state();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}
