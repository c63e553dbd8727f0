//! azint CLI
//!
//! Reduces raw area-detector frames to radial or radial × azimuthal
//! profiles from the command line.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::redundant_closure_for_method_calls,
    clippy::too_many_lines
)]

mod frames;
mod output;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use azint_algorithms::{
    average_dark, prepare_flat, reduce, AxisSpec, AzimuthalIntegrator, CenterMethod, Corrections,
    MappingCache, ReductionOptions,
};
use azint_core::{
    ErrorModel, Execution, Geometry, GeometryParams, IntegrationConfig, Mask, Profile, RadialUnit,
    SplitMethod,
};
use clap::{Parser, Subcommand, ValueEnum};
use ndarray::Array2;
use rayon::prelude::*;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Integration error: {0}")]
    Azint(#[from] azint_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Bad input: {0}")]
    Format(String),
}

/// Pixel splitting selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Whole pixel into the bin of its centre
    NoSplit,
    /// Split over the bounding box of the pixel footprint
    Bbox,
    /// Exact overlap of the pixel quadrilateral (default)
    Polygon,
}

impl From<Method> for SplitMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::NoSplit => SplitMethod::NoSplit,
            Method::Bbox => SplitMethod::BBox,
            Method::Polygon => SplitMethod::Polygon,
        }
    }
}

/// Radial unit selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Unit {
    /// 2θ in degrees
    #[value(name = "2th_deg")]
    TwoThetaDeg,
    /// 2θ in radians
    #[value(name = "2th_rad")]
    TwoThetaRad,
    /// q in nm⁻¹
    #[value(name = "q_nm")]
    QNm,
    /// q in Å⁻¹
    #[value(name = "q_a")]
    QA,
    /// Radius in mm
    #[value(name = "r_mm")]
    RMm,
}

impl From<Unit> for RadialUnit {
    fn from(unit: Unit) -> Self {
        match unit {
            Unit::TwoThetaDeg => RadialUnit::TwoThetaDeg,
            Unit::TwoThetaRad => RadialUnit::TwoThetaRad,
            Unit::QNm => RadialUnit::QNm,
            Unit::QA => RadialUnit::QA,
            Unit::RMm => RadialUnit::RMm,
        }
    }
}

/// Uncertainty estimate selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Errors {
    /// No sigma column
    None,
    /// Shot noise from the raw counts
    Poisson,
    /// Spread of the pixel values in each bin
    Azimuthal,
}

impl From<Errors> for ErrorModel {
    fn from(errors: Errors) -> Self {
        match errors {
            Errors::None => ErrorModel::NoErrors,
            Errors::Poisson => ErrorModel::Poisson,
            Errors::Azimuthal => ErrorModel::Azimuthal,
        }
    }
}

/// Reduction scheduling selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Schedule {
    /// Single thread
    Sequential,
    /// Parallel over output bins
    Bins,
    /// Parallel over pixel chunks
    Pixels,
}

impl From<Schedule> for Execution {
    fn from(schedule: Schedule) -> Self {
        match schedule {
            Schedule::Sequential => Execution::Sequential,
            Schedule::Bins => Execution::BinParallel,
            Schedule::Pixels => Execution::PixelParallel,
        }
    }
}

/// Per-pixel combination of dark frames.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum DarkMethod {
    Mean,
    Median,
    /// Mean between the `--dark-quantiles` bounds (0.5 0.5 by default)
    Quantiles,
}

impl DarkMethod {
    fn center(self, quantiles: Option<(f64, f64)>) -> CenterMethod {
        match self {
            DarkMethod::Mean => CenterMethod::Mean,
            DarkMethod::Median => CenterMethod::Median,
            DarkMethod::Quantiles => {
                let (lo, hi) = quantiles.unwrap_or(CenterMethod::DEFAULT_QUANTILES);
                CenterMethod::Quantiles(lo, hi)
            }
        }
    }
}

/// Azimuthal integration of area-detector frames.
#[derive(Parser)]
#[command(name = "azint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (default: one per core)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate raw little-endian f32 frames and write CSV
    Integrate {
        /// Geometry JSON file
        #[arg(short, long)]
        geometry: PathBuf,

        /// Raw frame file(s); each may hold several frames
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Integration settings JSON; explicit flags take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output CSV (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of radial bins
        #[arg(short, long, default_value = "1000")]
        bins: usize,

        /// Number of azimuthal bins; produces a 2-D map
        #[arg(long)]
        azimuthal_bins: Option<usize>,

        /// Radial unit
        #[arg(short, long, value_enum)]
        unit: Option<Unit>,

        /// Pixel splitting method
        #[arg(short, long, value_enum)]
        method: Option<Method>,

        /// Uncertainty estimate
        #[arg(long, value_enum)]
        errors: Option<Errors>,

        /// Reduction scheduling
        #[arg(long, value_enum)]
        execution: Option<Schedule>,

        /// Radial range in the output unit
        #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
        radial_range: Option<Vec<f64>>,

        /// Azimuthal range in degrees
        #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
        azimuth_range: Option<Vec<f64>>,

        /// Raw value marking invalid pixels
        #[arg(long, allow_negative_numbers = true)]
        dummy: Option<f64>,

        /// Tolerance around the dummy value
        #[arg(long)]
        delta_dummy: Option<f64>,

        /// Divide by the pixel solid angle
        #[arg(long)]
        solid_angle: bool,

        /// Polarization factor in [-1, 1]
        #[arg(long, allow_negative_numbers = true)]
        polarization: Option<f64>,

        /// Mask file: one raw f32 frame, non-zero pixels are masked
        #[arg(long)]
        mask: Option<PathBuf>,

        /// Dark frame file(s), combined pixel by pixel
        #[arg(long)]
        dark: Vec<PathBuf>,

        /// Flat frame file(s), averaged
        #[arg(long)]
        flat: Vec<PathBuf>,

        /// Subtract the dark from the flat before dividing
        #[arg(long)]
        flat_from_dark: bool,

        /// Combination of dark frames
        #[arg(long, value_enum, default_value = "median")]
        dark_method: DarkMethod,

        /// Quantile bounds for `--dark-method quantiles`
        #[arg(long, num_args = 2, value_names = ["LO", "HI"])]
        dark_quantiles: Option<Vec<f64>>,

        /// Reject dark values further than this many standard deviations
        #[arg(long)]
        cutoff: Option<f64>,
    },

    /// Show a geometry and its radial extents
    Info {
        /// Geometry JSON file
        geometry: PathBuf,

        /// Print the normalised geometry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Benchmark mapping construction and reduction on a synthetic frame
    Benchmark {
        /// Geometry JSON file (default: square detector, centred beam)
        #[arg(short, long)]
        geometry: Option<PathBuf>,

        /// Side of the synthetic detector when no geometry is given
        #[arg(long, default_value = "1024")]
        size: usize,

        /// Number of radial bins
        #[arg(short, long, default_value = "1000")]
        bins: usize,

        /// Number of iterations
        #[arg(short, long, default_value = "5")]
        iterations: usize,
    },
}

/// Sigma cutoff used when averaging flat frames.
const FLAT_CUTOFF: f64 = 4.0;

/// Correction inputs named on the command line.
struct CorrectionFiles<'a> {
    mask: Option<&'a Path>,
    dark: &'a [PathBuf],
    flat: &'a [PathBuf],
    dark_method: DarkMethod,
    dark_quantiles: Option<(f64, f64)>,
    cutoff: Option<f64>,
    flat_from_dark: bool,
}

/// Corrections loaded from disk, owned for the duration of a run.
struct CorrectionFrames {
    mask: Option<Mask>,
    dark: Option<Array2<f32>>,
    flat: Option<Array2<f32>>,
}

impl CorrectionFrames {
    fn as_corrections(&self) -> Corrections<'_> {
        Corrections {
            mask: self.mask.as_ref(),
            dark: self.dark.as_ref().map(|d| d.view()),
            flat: self.flat.as_ref().map(|f| f.view()),
            ..Corrections::default()
        }
    }
}

fn load_corrections(shape: (usize, usize), files: &CorrectionFiles<'_>) -> Result<CorrectionFrames> {
    let mask = match files.mask {
        Some(path) => {
            let frame = frames::read_frames(path, shape)?
                .into_iter()
                .next()
                .ok_or_else(|| CliError::Format(format!("{}: empty mask", path.display())))?;
            let mask = Mask::from_nonzero(frame.view());
            log::info!("mask: {} pixel(s) masked", mask.masked_count());
            Some(mask)
        }
        None => None,
    };

    let dark = if files.dark.is_empty() {
        None
    } else {
        let stack = frames::read_all(files.dark, shape)?;
        let views: Vec<_> = stack.iter().map(|f| f.view()).collect();
        let center = files.dark_method.center(files.dark_quantiles);
        log::info!("dark: {} frame(s), {}", views.len(), center);
        Some(average_dark(&views, center, files.cutoff)?)
    };

    let flat = if files.flat.is_empty() {
        None
    } else {
        let stack = frames::read_all(files.flat, shape)?;
        let views: Vec<_> = stack.iter().map(|f| f.view()).collect();
        log::info!("flat: {} frame(s)", views.len());
        let averaged = average_dark(&views, CenterMethod::Mean, Some(FLAT_CUTOFF))?;
        let dark = if files.flat_from_dark {
            if dark.is_none() {
                log::warn!("no dark given, flat used as is");
            }
            dark.as_ref().map(|d| d.view())
        } else {
            None
        };
        Some(prepare_flat(averaged.view(), dark))
    };

    Ok(CorrectionFrames { mask, dark, flat })
}

fn range_arg(values: Option<Vec<f64>>, name: &str) -> Result<Option<(f64, f64)>> {
    match values.as_deref() {
        None => Ok(None),
        Some([lo, hi]) => Ok(Some((*lo, *hi))),
        Some(other) => Err(CliError::Format(format!(
            "--{name} takes two values, got {}",
            other.len()
        ))),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn finite_extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

/// Ring pattern centred on the beam, for timing runs.
fn synthetic_frame(geometry: &Geometry) -> Array2<f32> {
    geometry
        .radial_array(RadialUnit::RMm)
        .mapv(|r| (100.0 + 1000.0 * (r * 0.8).sin().powi(8)) as f32)
}

fn time_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    match cli.command {
        Commands::Integrate {
            geometry,
            input,
            config,
            output,
            bins,
            azimuthal_bins,
            unit,
            method,
            errors,
            execution,
            radial_range,
            azimuth_range,
            dummy,
            delta_dummy,
            solid_angle,
            polarization,
            mask,
            dark,
            flat,
            flat_from_dark,
            dark_method,
            dark_quantiles,
            cutoff,
        } => {
            let start = Instant::now();
            let geometry = Arc::new(Geometry::from_json_file(&geometry)?);
            let shape = geometry.shape();

            let mut settings = match config {
                Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
                None => IntegrationConfig::default(),
            };
            if let Some(unit) = unit {
                settings = settings.with_unit(unit.into());
            }
            if let Some(method) = method {
                settings = settings.with_method(method.into());
            }
            if let Some(errors) = errors {
                settings = settings.with_error_model(errors.into());
            }
            if let Some(execution) = execution {
                settings = settings.with_execution(execution.into());
            }
            if let Some((lo, hi)) = range_arg(radial_range, "radial-range")? {
                settings = settings.with_radial_range(lo, hi);
            }
            if let Some((lo, hi)) = range_arg(azimuth_range, "azimuth-range")? {
                settings = settings.with_azimuth_range(lo, hi);
            }
            if let Some(dummy) = dummy {
                settings = settings.with_dummy(dummy, delta_dummy);
            }
            if solid_angle {
                settings = settings.with_solid_angle(true);
            }
            if let Some(factor) = polarization {
                settings = settings.with_polarization(factor);
            }
            settings.validate()?;
            log::debug!("settings: {:?}", settings);

            let files = CorrectionFiles {
                mask: mask.as_deref(),
                dark: &dark,
                flat: &flat,
                dark_method,
                dark_quantiles: range_arg(dark_quantiles, "dark-quantiles")?,
                cutoff,
                flat_from_dark,
            };
            let loaded = load_corrections(shape, &files)?;
            let corrections = loaded.as_corrections();
            let integrator = AzimuthalIntegrator::new(geometry).with_config(settings);

            let mut out = open_output(output.as_deref())?;
            let mut frame_index = 0usize;
            let mut wrote_header = false;
            for path in &input {
                let stack = frames::read_frames(path, shape)?;
                log::info!("{}: {} frame(s)", path.display(), stack.len());

                let profiles = stack
                    .par_iter()
                    .map(|frame| match azimuthal_bins {
                        Some(n_azim) => {
                            integrator.integrate2d(frame.view(), bins, n_azim, &corrections)
                        }
                        None => integrator.integrate1d(frame.view(), bins, &corrections),
                    })
                    .collect::<azint_core::Result<Vec<Profile>>>()?;

                for profile in &profiles {
                    if !wrote_header {
                        output::write_header(&mut out, profile)?;
                        wrote_header = true;
                    }
                    output::write_rows(&mut out, frame_index, profile)?;
                    frame_index += 1;
                }
            }
            out.flush()?;

            let stats = integrator.cache().statistics();
            log::info!(
                "integrated {} frame(s) in {:.2}s ({} mapping build(s), {} hit(s))",
                frame_index,
                start.elapsed().as_secs_f64(),
                stats.builds,
                stats.hits
            );
        }

        Commands::Info { geometry, json } => {
            let geometry = Geometry::from_json_file(&geometry)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&geometry)?);
                return Ok(());
            }

            let p = geometry.params();
            let (rows, cols) = geometry.shape();
            println!("Shape: {} x {} ({} pixels)", rows, cols, geometry.pixel_count());
            println!("Distance: {} m", p.dist);
            println!("PONI: {} m, {} m", p.poni1, p.poni2);
            println!("Rotations: {}, {}, {} rad", p.rot1, p.rot2, p.rot3);
            println!("Pixel size: {} m x {} m", p.pixel1, p.pixel2);
            println!("Wavelength: {} m", p.wavelength);

            println!("{:<10} | {:<15} | {:<15}", "Unit", "Min", "Max");
            println!("{:-<45}", "");
            for unit in RadialUnit::ALL {
                let (lo, hi) = finite_extent(geometry.radial_array(unit).iter().copied());
                println!("{:<10} | {:<15.6} | {:<15.6}", unit.name(), lo, hi);
            }
            let (lo, hi) = finite_extent(geometry.chi_array().iter().copied());
            println!("{:<10} | {:<15.6} | {:<15.6}", "chi_deg", lo, hi);
        }

        Commands::Benchmark {
            geometry,
            size,
            bins,
            iterations,
        } => {
            let geometry = Arc::new(match geometry {
                Some(path) => Geometry::from_json_file(path)?,
                None => {
                    let center = size as f64 / 2.0;
                    GeometryParams::new()
                        .with_shape(size, size)
                        .with_beam_center(center, center)
                        .build()?
                }
            });
            let frame = synthetic_frame(&geometry);
            let iterations = iterations.max(1);
            let (rows, cols) = geometry.shape();

            println!(
                "Benchmarking {}x{} frame, {} bins, {} iterations, {} threads",
                rows,
                cols,
                bins,
                iterations,
                rayon::current_num_threads()
            );
            println!(
                "{:<10} | {:<14} | {:<12} | {:<15} | {:<15} | {:<15}",
                "Method", "Execution", "Build (ms)", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<100}", "");

            for method in SplitMethod::ALL {
                let settings = IntegrationConfig::new().with_method(method);
                let integrator = AzimuthalIntegrator::new(Arc::clone(&geometry))
                    .with_cache(Arc::new(MappingCache::new(1)))
                    .with_config(settings.clone());

                let start = Instant::now();
                let mapping = integrator.mapping_1d(AxisSpec::bins(bins), None)?;
                let build_ms = time_ms(start);
                log::debug!(
                    "{}: {} entries, {:.1} MB",
                    method,
                    mapping.nnz(),
                    mapping.memory_bytes() as f64 / 1_000_000.0
                );

                for execution in [
                    Execution::Sequential,
                    Execution::BinParallel,
                    Execution::PixelParallel,
                ] {
                    let options = ReductionOptions::from(&settings.clone().with_execution(execution));
                    let mut times = Vec::with_capacity(iterations);
                    for _ in 0..iterations {
                        let start = Instant::now();
                        reduce(&mapping, frame.view(), &Corrections::new(), &options)?;
                        times.push(time_ms(start));
                    }

                    let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                    let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                    let mean_time = times.iter().sum::<f64>() / times.len() as f64;
                    println!(
                        "{:<10} | {:<14} | {:<12.2} | {:<15.2} | {:<15.2} | {:<15.2}",
                        method.name(),
                        format!("{:?}", execution),
                        build_ms,
                        mean_time,
                        min_time,
                        max_time
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_geometry(dir: &Path) -> PathBuf {
        let geometry = GeometryParams::new()
            .with_shape(8, 8)
            .with_beam_center(4.0, 4.0)
            .build()
            .unwrap();
        let path = dir.join("geometry.json");
        fs::write(&path, serde_json::to_string(&geometry).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_cli_parses_integrate() {
        let cli = Cli::try_parse_from([
            "azint",
            "integrate",
            "-g",
            "g.json",
            "a.raw",
            "b.raw",
            "--radial-range",
            "0",
            "5",
            "--azimuth-range",
            "-90",
            "90",
            "--method",
            "bbox",
            "--unit",
            "q_nm",
        ])
        .unwrap();
        match cli.command {
            Commands::Integrate {
                input,
                radial_range,
                azimuth_range,
                method,
                unit,
                ..
            } => {
                assert_eq!(input.len(), 2);
                assert_eq!(range_arg(radial_range, "r").unwrap(), Some((0.0, 5.0)));
                assert_eq!(range_arg(azimuth_range, "a").unwrap(), Some((-90.0, 90.0)));
                assert_eq!(SplitMethod::from(method.unwrap()), SplitMethod::BBox);
                assert_eq!(RadialUnit::from(unit.unwrap()), RadialUnit::QNm);
            }
            _ => panic!("expected integrate"),
        }
    }

    #[test]
    fn test_corrections_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let shape = (8, 8);
        let geometry = write_geometry(dir.path());
        let geometry = Geometry::from_json_file(geometry).unwrap();
        assert_eq!(geometry.shape(), shape);

        let dark_path = dir.path().join("dark.raw");
        let darks = vec![
            Array2::from_elem(shape, 1.0f32),
            Array2::from_elem(shape, 3.0f32),
            Array2::from_elem(shape, 2.0f32),
        ];
        frames::write_frames(&dark_path, &darks).unwrap();

        let flat_path = dir.path().join("flat.raw");
        frames::write_frames(&flat_path, &[Array2::from_elem(shape, 4.0f32)]).unwrap();

        let mask_path = dir.path().join("mask.raw");
        let mut mask = Array2::zeros(shape);
        mask[[0, 0]] = 1.0f32;
        frames::write_frames(&mask_path, &[mask]).unwrap();

        let darks = [dark_path];
        let flats = [flat_path];
        let files = CorrectionFiles {
            mask: Some(mask_path.as_path()),
            dark: &darks,
            flat: &flats,
            dark_method: DarkMethod::Median,
            dark_quantiles: None,
            cutoff: None,
            flat_from_dark: true,
        };
        let loaded = load_corrections(shape, &files).unwrap();
        assert_eq!(loaded.mask.as_ref().unwrap().masked_count(), 1);
        assert!(loaded.dark.as_ref().unwrap().iter().all(|&v| v == 2.0));
        assert!(loaded.flat.as_ref().unwrap().iter().all(|&v| v == 2.0));

        let corrections = loaded.as_corrections();
        let integrator = AzimuthalIntegrator::new(Arc::new(geometry))
            .with_config(IntegrationConfig::new().with_method(SplitMethod::NoSplit));
        let frame = Array2::from_elem(shape, 6.0f32);
        let profile = integrator.integrate1d(frame.view(), 4, &corrections).unwrap();
        for (v, w) in profile.intensity.iter().zip(&profile.sum_weight) {
            if *w > 0.0 {
                assert!((v - 2.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_range_arg_rejects_wrong_arity() {
        assert!(range_arg(Some(vec![1.0]), "radial-range").is_err());
        assert_eq!(range_arg(None, "radial-range").unwrap(), None);
    }

    #[test]
    fn test_dark_quantiles_option() {
        assert_eq!(
            DarkMethod::Quantiles.center(None),
            CenterMethod::Quantiles(0.5, 0.5)
        );
        let cli = Cli::try_parse_from([
            "azint",
            "integrate",
            "-g",
            "g.json",
            "a.raw",
            "--dark-method",
            "quantiles",
            "--dark-quantiles",
            "0.1",
            "0.9",
        ])
        .unwrap();
        match cli.command {
            Commands::Integrate {
                dark_method,
                dark_quantiles,
                ..
            } => {
                let bounds = range_arg(dark_quantiles, "dark-quantiles").unwrap();
                assert_eq!(dark_method.center(bounds), CenterMethod::Quantiles(0.1, 0.9));
            }
            _ => panic!("expected integrate"),
        }
    }
}
