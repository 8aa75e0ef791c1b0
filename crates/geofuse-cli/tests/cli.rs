use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PLACES: &str = r#"{
  "type": "FeatureCollection",
  "schema": {"geometry": "Point", "properties": {"id": "int", "name": "str", "value": "float", "category": "str"}},
  "crs": {"type": "name", "properties": {"name": "EPSG:4326"}},
  "features": [
    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
     "properties": {"id": 1, "name": "A", "value": 1.5, "category": "X"}},
    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [3.0, 4.0]},
     "properties": {"id": 2, "name": "B", "value": 2.5, "category": "Y"}}
  ]
}"#;

const SURVEY: &str = r#"{
  "type": "FeatureCollection",
  "schema": {"geometry": "Point", "properties": {"point_id": "int", "point_name": "str", "value": "float", "type": "str"}},
  "crs": {"type": "name", "properties": {"name": "EPSG:4326"}},
  "features": [
    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [5.0, 6.0]},
     "properties": {"point_id": 7, "point_name": "X", "value": 3.5, "type": "B"}}
  ]
}"#;

fn dataset(root: &Path, name: &str, body: &str) -> String {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("points.geojson"), body).unwrap();
    dir.to_str().unwrap().to_string()
}

fn geofuse() -> Command {
    Command::cargo_bin("geofuse").unwrap()
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn help_lists_commands() {
    geofuse()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("merge-same"))
        .stdout(predicate::str::contains("merge-diff"))
        .stdout(predicate::str::contains("gen-mapping"))
        .stdout(predicate::str::contains("validate-mapping"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn info_shows_layers_and_fields() {
    let dir = TempDir::new().unwrap();
    let places = dataset(dir.path(), "places", PLACES);

    geofuse()
        .args(["info", &places])
        .assert()
        .success()
        .stdout(predicate::str::contains("points"))
        .stdout(predicate::str::contains("EPSG:4326"))
        .stdout(predicate::str::contains("category"));
}

#[test]
fn info_on_missing_dataset_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing");

    geofuse()
        .args(["info", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot open dataset"));
}

#[test]
fn merge_same_writes_every_feature() {
    let dir = TempDir::new().unwrap();
    let a = dataset(dir.path(), "a", PLACES);
    let b = dataset(dir.path(), "b", PLACES);
    let out = dir.path().join("out");

    geofuse()
        .args(["merge-same", "-i", &a, &b, "-o", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 4 feature(s) in 1 layer(s)"));

    let written = read_json(&out.join("points.geojson"));
    assert_eq!(written["features"].as_array().unwrap().len(), 4);
    assert_eq!(written["crs"]["properties"]["name"], "EPSG:4326");
}

#[test]
fn merge_same_needs_two_inputs() {
    let dir = TempDir::new().unwrap();
    let a = dataset(dir.path(), "a", PLACES);
    let out = dir.path().join("out");

    geofuse()
        .args(["merge-same", "-i", &a, "-o", out.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least two input datasets"))
        .stderr(predicate::str::contains("Hint:"));
    assert!(!out.exists());
}

#[test]
fn merge_same_refuses_to_overwrite_an_input() {
    let dir = TempDir::new().unwrap();
    let a = dataset(dir.path(), "a", PLACES);
    let b = dataset(dir.path(), "b", PLACES);

    geofuse()
        .args(["merge-same", "-i", &a, &b, "-o", &a])
        .assert()
        .failure()
        .stderr(predicate::str::contains("overlaps input"))
        .stderr(predicate::str::contains("Hint:"));
    assert_eq!(fs::read_to_string(Path::new(&a).join("points.geojson")).unwrap(), PLACES);
}

#[test]
fn merge_same_reports_unknown_layers() {
    let dir = TempDir::new().unwrap();
    let a = dataset(dir.path(), "a", PLACES);
    let b = dataset(dir.path(), "b", PLACES);
    let out = dir.path().join("out");

    geofuse()
        .args(["merge-same", "-i", &a, &b, "-o", out.to_str().unwrap(), "-l", "lakes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("None of the requested layers"));
}

#[test]
fn merge_diff_with_edited_mapping() {
    let dir = TempDir::new().unwrap();
    let places = dataset(dir.path(), "places", PLACES);
    let survey = dataset(dir.path(), "survey", SURVEY);
    let mapping = dir.path().join("mapping.json");
    fs::write(
        &mapping,
        r#"{
            "point_id": {"target_field": "id", "conversion": "direct"},
            "point_name": {"target_field": "name", "conversion": "direct"},
            "value": {"target_field": "value", "conversion": "direct"},
            "type": {"target_field": "category", "conversion": "direct"}
        }"#,
    )
    .unwrap();
    let out = dir.path().join("out");

    geofuse()
        .args([
            "merge-diff",
            "-m",
            &places,
            "-s",
            &survey,
            "-p",
            mapping.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--pretty",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 3 feature(s)"));

    let written = read_json(&out.join("points.geojson"));
    let features = written["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);
    assert_eq!(
        features[2]["properties"],
        serde_json::json!({"category": "B", "id": 7, "name": "X", "value": 3.5})
    );
    let properties = written["schema"]["properties"].as_object().unwrap();
    assert_eq!(
        properties.keys().collect::<Vec<_>>(),
        vec!["id", "name", "value", "category"]
    );
}

#[test]
fn merge_diff_without_mapping_file_infers_one() {
    let dir = TempDir::new().unwrap();
    let places = dataset(dir.path(), "places", PLACES);
    let survey = dataset(dir.path(), "survey", SURVEY);
    let out = dir.path().join("out");
    let absent = dir.path().join("absent.json");

    geofuse()
        .args([
            "merge-diff",
            "-m",
            &places,
            "-s",
            &survey,
            "-p",
            absent.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("mapping-unavailable"));

    let written = read_json(&out.join("points.geojson"));
    assert!(written["schema"]["properties"]["point_id"].is_string());
}

#[test]
fn merge_diff_rejects_unknown_geometry_policy() {
    geofuse()
        .args(["merge-diff", "-m", "a", "-s", "b", "-o", "c", "--geometry-policy", "loose"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("geometry_policy"));
}

#[test]
fn malformed_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("settings.json");
    fs::write(&config, r#"{"layers": []}"#).unwrap();
    let places = dataset(dir.path(), "places", PLACES);

    geofuse()
        .args(["--config", config.to_str().unwrap(), "info", &places])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn gen_mapping_then_validate() {
    let dir = TempDir::new().unwrap();
    let places = dataset(dir.path(), "places", PLACES);
    let survey = dataset(dir.path(), "survey", SURVEY);
    let mapping = dir.path().join("mapping.json");
    let mapping_arg = mapping.to_str().unwrap();

    geofuse()
        .args(["gen-mapping", "-m", &places, "-s", &survey, "-l", "points", "-o", mapping_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 field(s)"));

    let template = read_json(&mapping);
    assert_eq!(template["value"]["conversion"], "direct");
    assert_eq!(template["point_id"]["conversion"], "new_field");

    geofuse()
        .args(["validate-mapping", "-p", mapping_arg, "-m", &places, "-s", &survey, "-l", "points"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));

    fs::write(
        &mapping,
        r#"{"point_id": {"target_field": "identifier", "conversion": "direct"}}"#,
    )
    .unwrap();
    geofuse()
        .args(["validate-mapping", "-p", mapping_arg, "-m", &places, "-s", &survey, "-l", "points"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("'identifier' does not exist"));
}
