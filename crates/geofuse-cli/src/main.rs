//! Command-line interface for `geofuse`, a schema reconciliation and layer
//! fusion tool for vector geospatial datasets.
//!
//! This binary provides a thin CLI over the [`geofuse_core`] library. Datasets
//! are `GeoJSON` directories (one `<layer>.geojson` per layer) or single
//! `.geojson` files.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for
//! structured logging. It parses arguments, configures logging, resolves
//! settings from an optional config file and the command line, and delegates
//! to the fusion engine.
//!
//! # Available Commands
//!
//! - `merge-same` - Concatenate layers of identical schema from several datasets
//! - `merge-diff` - Merge a secondary dataset into a primary one through a field mapping
//! - `gen-mapping` - Write an inferred mapping template for hand editing
//! - `validate-mapping` - Check a mapping document against two layer schemas
//! - `info` - Display the layers and fields of a dataset

mod display;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, info, warn};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geofuse_core::{
    Diagnostics, DifferentSchemaRequest, FusionConfig, FusionEngine, FusionError, GeometryPolicy,
    MappingSource, SameSchemaRequest, WebMercator, load_mapping, validate_mapping,
};
use geofuse_core_common::DatasetReader;
use geofuse_geojson::{GeoJsonReader, GeoJsonWriter, GeoJsonWriterOptions};

use crate::display::{LayerInfo, display_dataset_info, display_diagnostics, display_summary};

#[derive(Parser)]
#[command(
    name = "geofuse",
    version,
    about = "Schema reconciliation and layer fusion for vector geospatial data",
    long_about = "geofuse merges layers from several vector datasets into one.\n\
                  Layers with identical schemas are concatenated; layers with different \
                  schemas are reshaped through a field mapping first."
)]
/// Command-line arguments and options for the `geofuse` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    /// JSON settings file; command-line flags override its values.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `geofuse` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Concatenates layers with identical schemas from two or more datasets.
    ///
    /// The first dataset is the base: its layers define the output, and every
    /// other dataset contributes features to the layers it shares with it.
    MergeSame {
        /// Input datasets; the first is the base.
        #[arg(short, long, value_name = "DATASET", num_args = 1.., required = true)]
        inputs: Vec<String>,

        /// Output dataset directory.
        #[arg(short, long, value_name = "DATASET")]
        output: String,

        /// Only merge these layers.
        #[arg(short, long, value_name = "LAYER", num_args = 1..)]
        layers: Vec<String>,

        /// Indent written `GeoJSON`.
        #[arg(long)]
        pretty: bool,
    },

    /// Merges a secondary dataset into a primary one.
    ///
    /// Secondary features are reshaped into the primary schema using a
    /// mapping file, or a mapping inferred from the two schemas.
    MergeDiff {
        /// Primary dataset; its schemas and CRS win.
        #[arg(short = 'm', long, value_name = "DATASET")]
        primary: String,

        /// Secondary dataset to reshape and append.
        #[arg(short, long, value_name = "DATASET")]
        secondary: String,

        /// Output dataset directory.
        #[arg(short, long, value_name = "DATASET")]
        output: String,

        /// Mapping document; mappings are inferred when omitted.
        #[arg(short = 'p', long, value_name = "FILE")]
        mapping: Option<PathBuf>,

        /// Only merge these layers.
        #[arg(short, long, value_name = "LAYER", num_args = 1..)]
        layers: Vec<String>,

        /// How mismatched geometry kinds are handled (strict, promote, ignore).
        #[arg(long, value_name = "POLICY")]
        geometry_policy: Option<GeometryPolicy>,

        /// Indent written `GeoJSON`.
        #[arg(long)]
        pretty: bool,
    },

    /// Writes an inferred mapping template for one layer.
    GenMapping {
        /// Primary dataset (mapping target).
        #[arg(short = 'm', long, value_name = "DATASET")]
        primary: String,

        /// Secondary dataset (mapping source).
        #[arg(short, long, value_name = "DATASET")]
        secondary: String,

        /// Layer present in both datasets.
        #[arg(short, long, value_name = "LAYER")]
        layer: String,

        /// Where to write the mapping document.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Checks a mapping document against the schemas of one layer.
    ValidateMapping {
        /// Mapping document to check.
        #[arg(short = 'p', long, value_name = "FILE")]
        mapping: PathBuf,

        /// Primary dataset (mapping target).
        #[arg(short = 'm', long, value_name = "DATASET")]
        primary: String,

        /// Secondary dataset (mapping source).
        #[arg(short, long, value_name = "DATASET")]
        secondary: String,

        /// Layer present in both datasets.
        #[arg(short, long, value_name = "LAYER")]
        layer: String,
    },

    /// Displays the layers and fields of a dataset.
    Info {
        /// Path to the dataset.
        #[arg(value_name = "DATASET")]
        input: String,
    },
}

/// Entry point for the `geofuse` command-line interface.
///
/// Fatal errors are printed with a recovery hint where one is known, and the
/// process exits with a non-zero status.
fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.debug, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => FusionConfig::load(path).map_err(FusionError::from)?,
        None => FusionConfig::default(),
    };
    debug!("Loaded settings: {config:?}");

    match cli.command {
        Commands::MergeSame {
            inputs,
            output,
            layers,
            pretty,
        } => {
            let config = config.with_layers(layers);
            handle_merge_same(inputs, &output, &config, pretty)
        },
        Commands::MergeDiff {
            primary,
            secondary,
            output,
            mapping,
            layers,
            geometry_policy,
            pretty,
        } => {
            let mut config = config.with_layers(layers);
            if let Some(policy) = geometry_policy {
                config.geometry_policy = policy;
            }
            let request = DifferentSchemaRequest::new(primary, secondary, &output)
                .with_mapping(mapping.map_or(MappingSource::Infer, MappingSource::File))
                .with_layers(config.layers.clone());
            handle_merge_diff(&request, &config, pretty)
        },
        Commands::GenMapping {
            primary,
            secondary,
            layer,
            output,
        } => handle_gen_mapping(&primary, &secondary, &layer, &output),
        Commands::ValidateMapping {
            mapping,
            primary,
            secondary,
            layer,
        } => handle_validate_mapping(&mapping, &primary, &secondary, &layer),
        Commands::Info { input } => handle_info(&input),
    }
}

fn init_logging(debug: bool, verbose: bool) -> Result<()> {
    let log_level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    // Logs go to stderr so tables on stdout stay clean.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn report(err: &anyhow::Error) {
    if let Some(fusion) = err.downcast_ref::<FusionError>() {
        eprintln!("Error: {}", fusion.user_message());
        if let Some(hint) = fusion.recovery_suggestion() {
            eprintln!("Hint: {hint}");
        }
    } else {
        eprintln!("Error: {err:#}");
    }
}

fn writer(pretty: bool) -> GeoJsonWriter {
    GeoJsonWriter::new(GeoJsonWriterOptions::default().with_pretty(pretty))
}

fn handle_merge_same(
    inputs: Vec<String>,
    output: &str,
    config: &FusionConfig,
    pretty: bool,
) -> Result<()> {
    info!("Merge-same command:");
    info!("Inputs: {}", inputs.join(", "));
    info!("Output: {output}");

    let reader = GeoJsonReader::new();
    let writer = writer(pretty || config.pretty);
    let engine = FusionEngine::new(&reader, &writer, &WebMercator);

    let request = SameSchemaRequest::new(inputs, output).with_layers(config.layers.clone());
    let mut diagnostics = Diagnostics::new();
    let summary = engine.merge_same_schema(&request, &mut diagnostics)?;

    display_summary(output, &summary);
    display_diagnostics(diagnostics.records());
    Ok(())
}

fn handle_merge_diff(
    request: &DifferentSchemaRequest,
    config: &FusionConfig,
    pretty: bool,
) -> Result<()> {
    info!("Merge-diff command:");
    info!("Primary: {}", request.primary);
    info!("Secondary: {}", request.secondary);
    info!("Output: {}", request.output);
    debug!("Geometry policy: {}", config.geometry_policy);

    let reader = GeoJsonReader::new();
    let writer = writer(pretty || config.pretty);
    let engine = FusionEngine::new(&reader, &writer, &WebMercator)
        .with_geometry_policy(config.geometry_policy);

    let mut diagnostics = Diagnostics::new();
    let summary = engine.merge_different_schema(request, &mut diagnostics)?;

    display_summary(&request.output, &summary);
    display_diagnostics(diagnostics.records());
    Ok(())
}

fn handle_gen_mapping(primary: &str, secondary: &str, layer: &str, output: &Path) -> Result<()> {
    info!("Gen-mapping command:");
    let reader = GeoJsonReader::new();
    let writer = writer(false);
    let engine = FusionEngine::new(&reader, &writer, &WebMercator);

    let mapping = engine.generate_mapping_template(primary, secondary, layer, output)?;
    println!(
        "Wrote mapping template for '{layer}' ({} field(s)) to {}",
        mapping.len(),
        output.display()
    );
    Ok(())
}

fn handle_validate_mapping(
    mapping_path: &Path,
    primary: &str,
    secondary: &str,
    layer: &str,
) -> Result<()> {
    info!("Validate-mapping command:");
    let document = load_mapping(mapping_path).map_err(FusionError::from)?;
    let mapping = document.for_layer(layer).ok_or_else(|| {
        anyhow!(
            "Mapping document {} has no entry for layer '{layer}'.",
            mapping_path.display()
        )
    })?;

    let reader = GeoJsonReader::new();
    let writer = writer(false);
    let engine = FusionEngine::new(&reader, &writer, &WebMercator);
    let target = engine.layer_schema(primary, layer)?;
    let source = engine.layer_schema(secondary, layer)?;

    let validation = validate_mapping(mapping, &source, &target, engine.mapper().registry());
    if validation.is_valid() {
        println!("Mapping for '{layer}' is valid ({} field(s)).", mapping.len());
        return Ok(());
    }

    println!("Mapping for '{layer}' is invalid:");
    for error in &validation.errors {
        println!("  - {error}");
    }
    Err(anyhow!("mapping has {} error(s)", validation.errors.len()))
}

fn handle_info(input: &str) -> Result<()> {
    info!("Info command:");
    info!("Input: {input}");

    let dataset = GeoJsonReader::new()
        .open(input)
        .with_context(|| format!("Cannot open dataset '{input}'"))?;

    let mut layers = Vec::new();
    for name in dataset.layer_names() {
        let schema = match dataset.schema(&name) {
            Ok(schema) => schema,
            Err(err) => {
                warn!("Skipping layer {name}: {err}");
                continue;
            },
        };
        let schema = schema.with_crs(dataset.crs(&name).unwrap_or(None));
        let feature_count = dataset
            .features(&name)
            .ok()
            .map(|stream| stream.filter(|item| item.is_ok()).count());
        layers.push(LayerInfo {
            name,
            schema,
            feature_count,
        });
    }

    display_dataset_info(input, &layers);
    Ok(())
}
