//! Directory-of-`GeoJSON` datasets implementing the reader/writer contracts.

use std::cell::OnceCell;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use geofuse_core_common::error::IoResultExt;
use geofuse_core_common::{
    Dataset, DatasetError, DatasetReader, DatasetWriter, Feature, FeatureStream, OutputDataset,
    Result, Schema,
};
use log::{debug, error, info, warn};

use crate::parser::{ParsedLayer, parse_layer_bytes};
use crate::writer::{GeoJsonWriterOptions, write_layer};

const EXTENSIONS: [&str; 2] = ["geojson", "json"];

/// Opens `GeoJSON` datasets from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonReader;

impl GeoJsonReader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DatasetReader for GeoJsonReader {
    fn open(&self, identifier: &str) -> Result<Box<dyn Dataset>> {
        let root = PathBuf::from(identifier);
        let open_error = |reason: String| DatasetError::Open {
            identifier: identifier.to_string(),
            reason,
        };

        let layers = if root.is_dir() {
            let mut layers = Vec::new();
            for entry in fs::read_dir(&root).with_path(&root)? {
                let path = entry.with_path(&root)?.path();
                if path.is_file()
                    && has_geojson_extension(&path)
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    layers.push((stem.to_string(), path.clone()));
                }
            }
            layers.sort_by(|a, b| a.0.cmp(&b.0));
            layers
        } else if root.is_file() {
            let stem = root
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| open_error("file name is not valid UTF-8".to_string()))?;
            vec![(stem.to_string(), root.clone())]
        } else {
            return Err(open_error("path does not exist".to_string()));
        };

        debug!("Opened GeoJSON dataset {identifier} with {} layer(s)", layers.len());
        Ok(Box::new(GeoJsonDataset {
            identifier: identifier.to_string(),
            layers: layers
                .into_iter()
                .map(|(name, path)| LayerFile {
                    name,
                    path,
                    parsed: OnceCell::new(),
                })
                .collect(),
        }))
    }
}

fn has_geojson_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
}

/// A layer file, parsed on first use and kept for the life of the handle.
struct LayerFile {
    name: String,
    path: PathBuf,
    parsed: OnceCell<ParsedLayer>,
}

struct GeoJsonDataset {
    identifier: String,
    layers: Vec<LayerFile>,
}

impl GeoJsonDataset {
    fn load(&self, layer: &str) -> Result<&ParsedLayer> {
        let file = self
            .layers
            .iter()
            .find(|f| f.name == layer)
            .ok_or_else(|| DatasetError::LayerNotFound {
                dataset: self.identifier.clone(),
                layer: layer.to_string(),
            })?;
        if let Some(parsed) = file.parsed.get() {
            return Ok(parsed);
        }
        let bytes = fs::read(&file.path).with_path(&file.path)?;
        let parsed = parse_layer_bytes(&bytes, &file.path.display().to_string())?;
        debug!(
            "Parsed layer {layer} of {} ({} feature(s))",
            self.identifier,
            parsed.features.len()
        );
        Ok(file.parsed.get_or_init(|| parsed))
    }
}

impl Dataset for GeoJsonDataset {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|f| f.name.clone()).collect()
    }

    fn schema(&self, layer: &str) -> Result<Schema> {
        Ok(self.load(layer)?.schema.clone())
    }

    fn features(&self, layer: &str) -> Result<FeatureStream<'_>> {
        let parsed = self.load(layer)?;
        Ok(Box::new(parsed.features.iter().cloned().map(Ok)))
    }
}

/// Creates `GeoJSON` directory datasets on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonWriter {
    options: GeoJsonWriterOptions,
}

impl GeoJsonWriter {
    #[must_use]
    pub fn new(options: GeoJsonWriterOptions) -> Self {
        Self { options }
    }
}

impl DatasetWriter for GeoJsonWriter {
    fn create(&self, target: &str) -> Result<Box<dyn OutputDataset>> {
        let root = PathBuf::from(target);
        if root.exists() {
            warn!("Output {target} exists and will be overwritten");
            if root.is_dir() {
                fs::remove_dir_all(&root).with_path(&root)?;
            } else {
                fs::remove_file(&root).with_path(&root)?;
            }
        }
        fs::create_dir_all(&root).with_path(&root)?;

        Ok(Box::new(GeoJsonOutput {
            target: target.to_string(),
            root,
            options: self.options.clone(),
            layers: Vec::new(),
            finalized: false,
        }))
    }
}

struct PendingLayer {
    name: String,
    schema: Schema,
    features: Vec<Feature>,
}

struct GeoJsonOutput {
    target: String,
    root: PathBuf,
    options: GeoJsonWriterOptions,
    layers: Vec<PendingLayer>,
    finalized: bool,
}

impl GeoJsonOutput {
    fn ensure_open(&self) -> Result<()> {
        if self.finalized {
            Err(DatasetError::Finalized {
                target: self.target.clone(),
            })
        } else {
            Ok(())
        }
    }
}

impl OutputDataset for GeoJsonOutput {
    fn target(&self) -> &str {
        &self.target
    }

    fn create_layer(&mut self, name: &str, schema: &Schema) -> Result<()> {
        self.ensure_open()?;
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(DatasetError::Parse {
                context: "layer name".to_string(),
                message: format!("'{name}' cannot be used as a file name"),
            });
        }
        if self.layers.iter().any(|l| l.name == name) {
            return Err(DatasetError::LayerExists {
                layer: name.to_string(),
            });
        }
        self.layers.push(PendingLayer {
            name: name.to_string(),
            schema: schema.clone(),
            features: Vec::new(),
        });
        Ok(())
    }

    fn write_features(&mut self, layer: &str, features: Vec<Feature>) -> Result<()> {
        self.ensure_open()?;
        let pending = self
            .layers
            .iter_mut()
            .find(|l| l.name == layer)
            .ok_or_else(|| DatasetError::LayerNotFound {
                dataset: self.target.clone(),
                layer: layer.to_string(),
            })?;
        pending.features.extend(features);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        for layer in &self.layers {
            let path = self.root.join(format!("{}.geojson", layer.name));
            let file = File::create(&path).with_path(&path)?;
            let mut writer = BufWriter::new(file);
            write_layer(&mut writer, &layer.schema, &layer.features, &self.options)?;
            writer.flush().with_path(&path)?;
            info!("Wrote {} feature(s) to {}", layer.features.len(), path.display());
        }
        self.finalized = true;
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Drop for GeoJsonOutput {
    fn drop(&mut self) {
        if !self.finalized
            && let Err(err) = self.finalize()
        {
            error!("Failed to finalize {} on close: {err}", self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofuse_core_common::{FieldType, GeometryKind};
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new(GeometryKind::Point, [("id", FieldType::Int)]).unwrap()
    }

    #[test]
    fn missing_path_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(GeoJsonReader::new().open(missing.to_str().unwrap()).is_err());
    }

    #[test]
    fn single_file_is_one_layer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roads.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":null,"properties":{"id":1}}]}"#,
        )
        .unwrap();

        let dataset = GeoJsonReader::new().open(path.to_str().unwrap()).unwrap();
        assert_eq!(dataset.layer_names(), vec!["roads".to_string()]);
        assert_eq!(dataset.features("roads").unwrap().count(), 1);
        assert!(dataset.schema("rivers").is_err());
    }

    #[test]
    fn output_writes_one_file_per_layer() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");
        let target = target.to_str().unwrap();

        let mut out = GeoJsonWriter::default().create(target).unwrap();
        out.create_layer("b_layer", &schema()).unwrap();
        out.create_layer("a_layer", &schema()).unwrap();
        out.write_features("a_layer", vec![Feature::default().with_property("id", 3_i64)])
            .unwrap();
        assert!(!Path::new(target).join("a_layer.geojson").exists());
        out.finalize().unwrap();
        assert!(out.is_finalized());

        let dataset = GeoJsonReader::new().open(target).unwrap();
        assert_eq!(
            dataset.layer_names(),
            vec!["a_layer".to_string(), "b_layer".to_string()]
        );
        assert_eq!(dataset.schema("a_layer").unwrap().field_type("id"), Some(FieldType::Int));
        assert_eq!(dataset.features("a_layer").unwrap().count(), 1);
        assert_eq!(dataset.features("b_layer").unwrap().count(), 0);
    }

    #[test]
    fn create_overwrites_existing_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.geojson"), "{}").unwrap();

        let out = GeoJsonWriter::default().create(target.to_str().unwrap()).unwrap();
        drop(out);
        assert!(!target.join("stale.geojson").exists());
    }

    #[test]
    fn layers_are_parsed_once_per_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wells.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":null,"properties":{"id":1}}]}"#,
        )
        .unwrap();

        let dataset = GeoJsonReader::new().open(path.to_str().unwrap()).unwrap();
        assert_eq!(dataset.schema("wells").unwrap().field_type("id"), Some(FieldType::Int));

        fs::write(&path, "not json").unwrap();
        assert_eq!(dataset.features("wells").unwrap().count(), 1);
        assert!(dataset.crs("wells").unwrap().is_none());
        assert_eq!(dataset.schema("wells").unwrap().len(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_flush_fails_finalize() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");

        let mut out = GeoJsonWriter::default().create(target.to_str().unwrap()).unwrap();
        out.create_layer("points", &schema()).unwrap();
        out.write_features("points", vec![Feature::default().with_property("id", 1_i64)])
            .unwrap();
        std::os::unix::fs::symlink("/dev/full", target.join("points.geojson")).unwrap();

        assert!(matches!(out.finalize(), Err(DatasetError::Io { .. })));
        assert!(!out.is_finalized());
    }

    #[test]
    fn invalid_layer_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");
        let mut out = GeoJsonWriter::default().create(target.to_str().unwrap()).unwrap();
        assert!(out.create_layer("../escape", &schema()).is_err());
        assert!(out.create_layer("", &schema()).is_err());
    }
}
