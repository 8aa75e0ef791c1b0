//! Homogeneous merge behaviour against the in-memory catalog.

use geo_types::{Geometry, Point};
use geofuse_core::{
    DiagnosticKind, Diagnostics, FusionEngine, FusionError, SameSchemaRequest, WebMercator,
};
use geofuse_core_common::{
    Crs, Dataset, DatasetError, DatasetReader, Feature, FeatureStream, FieldType, GeometryKind,
    MemoryCatalog, Schema,
};

fn points_schema() -> Schema {
    Schema::new(
        GeometryKind::Point,
        [("id", FieldType::Int), ("name", FieldType::String)],
    )
    .unwrap()
    .with_crs(Some(Crs::new("EPSG:4326")))
}

fn roads_schema() -> Schema {
    Schema::new(GeometryKind::LineString, [("ref", FieldType::String)]).unwrap()
}

fn points(count: usize, first_id: i64) -> Vec<Feature> {
    (0..count)
        .map(|i| {
            let id = first_id + i64::try_from(i).unwrap();
            Feature::new(Some(Point::new(id as f64, 1.0).into()))
                .with_property("id", id)
                .with_property("name", format!("p{id}"))
        })
        .collect()
}

fn seeded(counts: &[usize]) -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    let mut next_id = 0;
    for (i, count) in counts.iter().enumerate() {
        catalog.insert_layer(&format!("ds{i}"), "points", points_schema(), points(*count, next_id));
        next_id += i64::try_from(*count).unwrap();
    }
    catalog
}

fn inputs(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("ds{i}")).collect()
}

#[test]
fn feature_counts_add_up() {
    let catalog = seeded(&[3, 5, 0, 2]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);
    let mut diagnostics = Diagnostics::new();

    let summary = engine
        .merge_same_schema(&SameSchemaRequest::new(inputs(4), "out"), &mut diagnostics)
        .unwrap();

    assert!(diagnostics.is_empty(), "{:?}", diagnostics.records());
    let written = catalog.layer_features("out", "points").unwrap();
    assert_eq!(written.len(), 10);
    assert_eq!(summary.total_features(), 10);
    let layer = summary.layer("points").unwrap();
    assert_eq!(layer.sources, inputs(4));

    // Base features first, then each other dataset in order.
    let ids: Vec<_> = written.iter().map(|f| f.property("id").cloned()).collect();
    let expected: Vec<_> = points(10, 0).iter().map(|f| f.property("id").cloned()).collect();
    assert_eq!(ids, expected);

    assert_eq!(catalog.layer_schema("out", "points").unwrap(), points_schema());
    assert_eq!(catalog.open_handles(), 0);
}

#[test]
fn fewer_than_two_inputs_is_fatal() {
    let catalog = seeded(&[1]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);

    for n in [0, 1] {
        let err = engine
            .merge_same_schema(&SameSchemaRequest::new(inputs(n), "out"), &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, FusionError::InsufficientInputs { count } if count == n));
    }
    assert!(!catalog.contains("out"));
}

#[test]
fn filter_without_matches_is_fatal() {
    let catalog = seeded(&[1, 1]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);
    let mut diagnostics = Diagnostics::new();

    let request = SameSchemaRequest::new(inputs(2), "out").with_layers(Some(vec!["lakes".to_string()]));
    let err = engine.merge_same_schema(&request, &mut diagnostics).unwrap_err();

    assert!(matches!(err, FusionError::NoLayers { filtered: true, .. }));
    assert_eq!(diagnostics.of_kind(DiagnosticKind::LayerAbsent).count(), 1);
    assert!(!catalog.contains("out"));
    assert_eq!(catalog.open_handles(), 0);
}

#[test]
fn filter_keeps_dataset_order() {
    let catalog = seeded(&[1, 1]);
    for ds in ["ds0", "ds1"] {
        catalog.insert_layer(ds, "roads", roads_schema(), vec![]);
        catalog.insert_layer(ds, "rivers", roads_schema(), vec![]);
    }
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);

    let request = SameSchemaRequest::new(inputs(2), "out")
        .with_layers(Some(vec!["rivers".to_string(), "points".to_string()]));
    let summary = engine.merge_same_schema(&request, &mut Diagnostics::new()).unwrap();

    let names: Vec<&str> = summary.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["points", "rivers"]);
    assert_eq!(
        catalog.layer_names("out").unwrap(),
        vec!["points".to_string(), "rivers".to_string()]
    );
}

#[test]
fn incompatible_layer_is_skipped_with_one_diagnostic() {
    let catalog = MemoryCatalog::new();
    let int_schema = Schema::new(GeometryKind::Point, [("x", FieldType::Int)]).unwrap();
    let str_schema = Schema::new(GeometryKind::Point, [("x", FieldType::String)]).unwrap();
    catalog.insert_layer("a", "layer", int_schema.clone(), vec![Feature::default().with_property("x", 1_i64)]);
    catalog.insert_layer("b", "layer", str_schema, vec![Feature::default().with_property("x", "1")]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);
    let mut diagnostics = Diagnostics::new();

    let summary = engine
        .merge_same_schema(&SameSchemaRequest::new(["a", "b"], "out"), &mut diagnostics)
        .unwrap();

    assert_eq!(diagnostics.len(), 1);
    let record = &diagnostics.records()[0];
    assert_eq!(record.kind, DiagnosticKind::SchemaIncompatible);
    assert_eq!(record.dataset.as_deref(), Some("b"));
    assert_eq!(record.layer.as_deref(), Some("layer"));
    assert!(record.message.contains("mismatched types"));

    assert_eq!(catalog.layer_features("out", "layer").unwrap().len(), 1);
    assert_eq!(catalog.layer_schema("out", "layer").unwrap(), int_schema);
    assert_eq!(summary.layer("layer").unwrap().sources, vec!["a".to_string()]);
}

#[test]
fn unreadable_and_incomplete_datasets_are_skipped() {
    let catalog = seeded(&[2, 3]);
    catalog.insert_layer("ds0", "roads", roads_schema(), vec![Feature::default().with_property("ref", "A1")]);
    catalog.insert_layer("ds1", "roads", roads_schema(), vec![]);
    catalog.mark_unreadable("ds1", "roads");
    catalog.insert_layer("ds3", "roads", roads_schema(), vec![Feature::default().with_property("ref", "B2")]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);
    let mut diagnostics = Diagnostics::new();

    let request = SameSchemaRequest::new(["ds0", "ds1", "missing", "ds3"], "out");
    let summary = engine.merge_same_schema(&request, &mut diagnostics).unwrap();

    assert_eq!(diagnostics.of_kind(DiagnosticKind::ReadFailed).count(), 1);
    assert_eq!(diagnostics.of_kind(DiagnosticKind::DatasetUnreadable).count(), 1);
    // ds3 holds no points layer.
    assert_eq!(diagnostics.of_kind(DiagnosticKind::LayerAbsent).count(), 1);

    assert_eq!(summary.layer("points").unwrap().features_written, 5);
    assert_eq!(summary.layer("roads").unwrap().features_written, 2);
    assert_eq!(catalog.open_handles(), 0);
}

#[test]
fn unreadable_base_is_fatal() {
    let catalog = seeded(&[1, 1]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);
    let err = engine
        .merge_same_schema(&SameSchemaRequest::new(["nope", "ds1"], "out"), &mut Diagnostics::new())
        .unwrap_err();
    assert!(matches!(err, FusionError::DatasetUnreadable { ref dataset, .. } if dataset == "nope"));
    assert!(err.recovery_suggestion().is_some());
    assert_eq!(catalog.open_handles(), 0);
}

#[test]
fn output_failures_are_fatal() {
    let catalog = seeded(&[1, 1]);
    catalog.reject_target("rejected");
    catalog.fail_finalize("unfinished");
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);

    let err = engine
        .merge_same_schema(&SameSchemaRequest::new(inputs(2), "rejected"), &mut Diagnostics::new())
        .unwrap_err();
    assert!(matches!(err, FusionError::OutputCreateFailed { .. }));

    let err = engine
        .merge_same_schema(&SameSchemaRequest::new(inputs(2), "unfinished"), &mut Diagnostics::new())
        .unwrap_err();
    assert!(matches!(err, FusionError::FinalizeFailed { .. }));
    assert_eq!(catalog.open_handles(), 0);
}

#[test]
fn output_naming_an_input_is_rejected_untouched() {
    let catalog = seeded(&[2, 3]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);

    let err = engine
        .merge_same_schema(&SameSchemaRequest::new(inputs(2), "ds1"), &mut Diagnostics::new())
        .unwrap_err();
    assert!(
        matches!(err, FusionError::OutputIsInput { ref target, ref dataset } if target == "ds1" && dataset == "ds1")
    );
    assert!(err.recovery_suggestion().is_some());
    assert_eq!(catalog.layer_features("ds0", "points").unwrap().len(), 2);
    assert_eq!(catalog.layer_features("ds1", "points").unwrap().len(), 3);
    assert_eq!(catalog.open_handles(), 0);
}

#[test]
fn contributions_in_other_crs_are_reprojected() {
    let catalog = seeded(&[1]);
    let mercator = points_schema().with_crs(Some(Crs::new("EPSG:3857")));
    let projected = Feature::new(Some(Point::new(1_113_194.907_932_735_7, 0.0).into()))
        .with_property("id", 99_i64)
        .with_property("name", "far");
    catalog.insert_layer("ds1", "points", mercator, vec![projected]);
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);

    engine
        .merge_same_schema(&SameSchemaRequest::new(inputs(2), "out"), &mut Diagnostics::new())
        .unwrap();

    let written = catalog.layer_features("out", "points").unwrap();
    let Some(Geometry::Point(p)) = written[1].geometry else {
        panic!("expected a point");
    };
    assert!((p.x() - 10.0).abs() < 1e-9);
    assert!(p.y().abs() < 1e-9);
}

#[test]
fn unsupported_reprojection_skips_the_contribution() {
    let catalog = seeded(&[1]);
    let utm = points_schema().with_crs(Some(Crs::new("EPSG:32633")));
    catalog.insert_layer("ds1", "points", utm, points(4, 10));
    let engine = FusionEngine::new(&catalog, &catalog, &WebMercator);
    let mut diagnostics = Diagnostics::new();

    let summary = engine
        .merge_same_schema(&SameSchemaRequest::new(inputs(2), "out"), &mut diagnostics)
        .unwrap();
    assert_eq!(diagnostics.of_kind(DiagnosticKind::ReprojectFailed).count(), 1);
    assert_eq!(summary.total_features(), 1);
}

/// Wraps the catalog so that the `flaky` dataset yields one unreadable
/// feature in every layer.
struct FlakyReader {
    catalog: MemoryCatalog,
}

struct FlakyDataset {
    inner: Box<dyn Dataset>,
}

impl DatasetReader for FlakyReader {
    fn open(&self, identifier: &str) -> geofuse_core_common::Result<Box<dyn Dataset>> {
        let inner = self.catalog.open(identifier)?;
        if identifier == "flaky" {
            Ok(Box::new(FlakyDataset { inner }))
        } else {
            Ok(inner)
        }
    }
}

impl Dataset for FlakyDataset {
    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    fn layer_names(&self) -> Vec<String> {
        self.inner.layer_names()
    }

    fn schema(&self, layer: &str) -> geofuse_core_common::Result<Schema> {
        self.inner.schema(layer)
    }

    fn features(&self, layer: &str) -> geofuse_core_common::Result<FeatureStream<'_>> {
        let mut items: Vec<_> = self.inner.features(layer)?.collect();
        items.insert(
            1,
            Err(DatasetError::Parse {
                context: "feature".to_string(),
                message: "bad geometry".to_string(),
            }),
        );
        Ok(Box::new(items.into_iter()))
    }
}

#[test]
fn unreadable_features_do_not_drop_their_neighbours() {
    let catalog = seeded(&[2]);
    catalog.insert_layer("flaky", "points", points_schema(), points(3, 100));
    let reader = FlakyReader {
        catalog: catalog.clone(),
    };
    let engine = FusionEngine::new(&reader, &catalog, &WebMercator);
    let mut diagnostics = Diagnostics::new();

    let summary = engine
        .merge_same_schema(&SameSchemaRequest::new(["ds0", "flaky"], "out"), &mut diagnostics)
        .unwrap();

    assert_eq!(summary.total_features(), 5);
    assert_eq!(diagnostics.of_kind(DiagnosticKind::ReadFailed).count(), 1);
    assert_eq!(catalog.open_handles(), 0);
}
