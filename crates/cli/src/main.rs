//! ThermoGIS CLI - urban heat island analysis of Landsat scenes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use thermogis_algorithms::pipeline::{AnalysisConfig, AnalysisOutput, UhiAnalysis};
use thermogis_algorithms::statistics::ZonalAccumulator;
use thermogis_core::io::{read_band, write_band};
use thermogis_core::{RasterImage, CRS};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "thermogis")]
#[command(author, version, about = "Urban heat island analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a single-band raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Run the full analysis described by a JSON run file
    Analyze {
        /// Run file: analysis config, scene manifests, CRS and output directory
        run: PathBuf,
        /// Override the run file's output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip writing GeoTIFF artifacts
        #[arg(long)]
        no_artifacts: bool,
    },
}

// ─── Run file ───────────────────────────────────────────────────────────

/// Band name → GeoTIFF path for one scene
type SceneManifest = BTreeMap<String, PathBuf>;

#[derive(Debug, Deserialize)]
struct RunFile {
    #[serde(default)]
    config: AnalysisConfig,
    /// Scenes of the analysis year
    current: Vec<SceneManifest>,
    /// Scenes of the reference year
    reference: Vec<SceneManifest>,
    /// Assigned to every band when the files carry no usable CRS
    epsg: Option<u32>,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl RunFile {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        let mut run: RunFile = serde_json::from_str(&text)
            .with_context(|| format!("Invalid run file {}", path.display()))?;

        // Relative paths are taken from the run file's directory
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for manifest in run.current.iter_mut().chain(run.reference.iter_mut()) {
            for band_path in manifest.values_mut() {
                if band_path.is_relative() {
                    *band_path = base.join(&*band_path);
                }
            }
        }
        if run.output_dir.is_relative() {
            run.output_dir = base.join(&run.output_dir);
        }
        Ok(run)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_scene(manifest: &SceneManifest, epsg: Option<u32>) -> Result<RasterImage> {
    let mut image = RasterImage::new();
    for (band, path) in manifest {
        let mut raster = read_band(path)
            .with_context(|| format!("Failed to read band {} from {}", band, path.display()))?;
        if let Some(code) = epsg {
            raster.set_crs(Some(CRS::from_epsg(code)));
        }
        image = image
            .with_band(band.clone(), raster)
            .with_context(|| format!("Band {} is not aligned with the scene", band))?;
    }
    Ok(image)
}

fn load_scenes(label: &str, manifests: &[SceneManifest], epsg: Option<u32>) -> Result<Vec<RasterImage>> {
    let pb = spinner(&format!("Reading {} scenes...", label));
    let scenes = manifests
        .iter()
        .map(|m| load_scene(m, epsg))
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();
    info!("{}: {} scenes", label, scenes.len());
    Ok(scenes)
}

fn write_outputs(output: &AnalysisOutput, dir: &Path, artifacts: bool) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    if artifacts {
        let pb = spinner("Writing artifacts...");
        for artifact in &output.artifacts {
            let path = dir.join(format!("{}.tif", artifact.name));
            write_band(&artifact.raster, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        pb.finish_and_clear();
    }

    let report = serde_json::to_string_pretty(&output.report).context("Failed to encode report")?;
    let path = dir.join("report.json");
    std::fs::write(&path, &report).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}", report);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let raster = read_band(&input).context("Failed to read raster")?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster
                .data()
                .iter()
                .filter(|&&v| !raster.is_nodata(v))
                .fold(ZonalAccumulator::identity(), |acc, &v| acc.push(v));

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.transform().cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            println!("\nStatistics:");
            if !stats.is_empty() {
                println!("  Min: {:.4}", stats.finish(thermogis_algorithms::statistics::Reducer::Min));
                println!("  Max: {:.4}", stats.finish(thermogis_algorithms::statistics::Reducer::Max));
                println!("  Mean: {:.4}", stats.mean());
                println!("  StdDev: {:.4}", stats.std_dev());
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.count(),
                100.0 * stats.count() as f64 / raster.len().max(1) as f64
            );
        }

        Commands::Analyze {
            run,
            output,
            no_artifacts,
        } => {
            let run_file = RunFile::load(&run)?;
            let current = load_scenes("current", &run_file.current, run_file.epsg)?;
            let reference = load_scenes("reference", &run_file.reference, run_file.epsg)?;

            let analysis = UhiAnalysis::new(run_file.config);
            let pb = spinner("Running analysis...");
            let start = Instant::now();
            let result = analysis.run(&current, &reference);
            pb.finish_and_clear();
            let result = result.context("Analysis failed")?;
            info!("Analysis time: {:.2?}", start.elapsed());

            let dir = output.unwrap_or(run_file.output_dir);
            write_outputs(&result, &dir, !no_artifacts)?;
            println!("Outputs saved to: {}", dir.display());
        }
    }

    Ok(())
}
