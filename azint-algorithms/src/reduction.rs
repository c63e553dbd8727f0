//! Weighted reduction of a corrected frame through a sparse mapping.
//!
//! Every valid pixel is first corrected (dark, flat, solid angle,
//! polarization) into a signal and a variance; the mapping weights then
//! accumulate per-bin sums from which the normalised intensity and its
//! uncertainty follow. The three execution strategies produce the same sums
//! up to floating-point reassociation.
#![allow(
    clippy::cast_possible_truncation,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

use std::time::Instant;

use azint_core::{
    EmptyBins, EmptyInputPolicy, Error, ErrorModel, Execution, IntegrationConfig, Mask, Profile,
    Result,
};
use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::mapping::SparseMapping;

/// Per-pixel correction arrays, all optional and borrowed from the caller.
///
/// The corrected signal of a pixel is
/// `(raw - dark) / (flat * solid_angle * polarization)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Corrections<'a> {
    /// Pixels to ignore (`true` = masked).
    pub mask: Option<&'a Mask>,
    /// Dark current, subtracted from the raw signal.
    pub dark: Option<ArrayView2<'a, f32>>,
    /// Flat field, divided out.
    pub flat: Option<ArrayView2<'a, f32>>,
    /// Solid angle, divided out.
    pub solid_angle: Option<ArrayView2<'a, f32>>,
    /// Polarization factor, divided out.
    pub polarization: Option<ArrayView2<'a, f32>>,
    /// Per-pixel variance for [`ErrorModel::Variance`].
    pub variance: Option<ArrayView2<'a, f32>>,
}

impl<'a> Corrections<'a> {
    /// No corrections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mask.
    #[must_use]
    pub fn with_mask(mut self, mask: &'a Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Sets the dark frame.
    #[must_use]
    pub fn with_dark(mut self, dark: ArrayView2<'a, f32>) -> Self {
        self.dark = Some(dark);
        self
    }

    /// Sets the flat field.
    #[must_use]
    pub fn with_flat(mut self, flat: ArrayView2<'a, f32>) -> Self {
        self.flat = Some(flat);
        self
    }

    /// Sets the solid-angle array.
    #[must_use]
    pub fn with_solid_angle(mut self, solid_angle: ArrayView2<'a, f32>) -> Self {
        self.solid_angle = Some(solid_angle);
        self
    }

    /// Sets the polarization array.
    #[must_use]
    pub fn with_polarization(mut self, polarization: ArrayView2<'a, f32>) -> Self {
        self.polarization = Some(polarization);
        self
    }

    /// Sets the variance array.
    #[must_use]
    pub fn with_variance(mut self, variance: ArrayView2<'a, f32>) -> Self {
        self.variance = Some(variance);
        self
    }

    fn check_shapes(&self, shape: (usize, usize)) -> Result<()> {
        if let Some(mask) = self.mask {
            if mask.shape() != shape {
                return Err(Error::shape_mismatch("mask", shape, mask.shape()));
            }
        }
        for (name, array) in [
            ("dark", self.dark),
            ("flat", self.flat),
            ("solid_angle", self.solid_angle),
            ("polarization", self.polarization),
            ("variance", self.variance),
        ] {
            if let Some(array) = array {
                if array.dim() != shape {
                    return Err(Error::shape_mismatch(name, shape, array.dim()));
                }
            }
        }
        Ok(())
    }
}

/// Frame-level reduction settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReductionOptions {
    /// Raw value flagging invalid pixels.
    pub dummy: Option<f64>,
    /// Tolerance around `dummy`.
    pub delta_dummy: Option<f64>,
    /// Uncertainty estimate.
    pub error_model: ErrorModel,
    /// Lower clamp for corrected intensities.
    pub floor: Option<f64>,
    /// Empty-bin reporting.
    pub empty_bins: EmptyBins,
    /// Behaviour when nothing contributes.
    pub empty_input: EmptyInputPolicy,
    /// Scheduling.
    pub execution: Execution,
}

impl From<&IntegrationConfig> for ReductionOptions {
    fn from(config: &IntegrationConfig) -> Self {
        Self {
            dummy: config.dummy,
            delta_dummy: config.delta_dummy,
            error_model: config.error_model,
            floor: config.floor,
            empty_bins: config.empty_bins,
            empty_input: config.empty_input,
            execution: config.execution,
        }
    }
}

impl ReductionOptions {
    fn is_dummy(&self, raw: f64) -> bool {
        match (self.dummy, self.delta_dummy) {
            (Some(dummy), Some(delta)) => (raw - dummy).abs() <= delta,
            (Some(dummy), None) => raw == dummy,
            (None, _) => false,
        }
    }
}

/// Corrected signal and variance of one pixel; NaN signal marks an
/// excluded pixel.
#[derive(Debug, Clone, Copy)]
struct PixelValue {
    signal: f64,
    variance: f64,
}

impl PixelValue {
    const EXCLUDED: PixelValue = PixelValue {
        signal: f64::NAN,
        variance: 0.0,
    };

    #[inline]
    fn is_valid(&self) -> bool {
        !self.signal.is_nan()
    }
}

/// Running sums of one bin.
#[derive(Debug, Clone, Copy, Default)]
struct BinAccumulator {
    sum_weight: f64,
    sum_weight2: f64,
    sum_signal: f64,
    sum_signal2: f64,
    sum_variance: f64,
    count: u32,
}

impl BinAccumulator {
    #[inline]
    fn add(&mut self, weight: f32, pixel: &PixelValue) {
        if !pixel.is_valid() || weight <= 0.0 {
            return;
        }
        let w = f64::from(weight);
        self.sum_weight += w;
        self.sum_weight2 += w * w;
        self.sum_signal += w * pixel.signal;
        self.sum_signal2 += w * pixel.signal * pixel.signal;
        self.sum_variance += w * w * pixel.variance;
        self.count += 1;
    }

    #[inline]
    fn merge(&mut self, other: &BinAccumulator) {
        self.sum_weight += other.sum_weight;
        self.sum_weight2 += other.sum_weight2;
        self.sum_signal += other.sum_signal;
        self.sum_signal2 += other.sum_signal2;
        self.sum_variance += other.sum_variance;
        self.count += other.count;
    }

    fn is_empty(&self) -> bool {
        self.count == 0 || self.sum_weight <= 0.0
    }

    fn mean(&self) -> f64 {
        self.sum_signal / self.sum_weight
    }

    fn sigma(&self, model: ErrorModel) -> f64 {
        match model {
            ErrorModel::NoErrors => f64::NAN,
            ErrorModel::Poisson | ErrorModel::Variance => self.sum_variance.sqrt() / self.sum_weight,
            ErrorModel::Azimuthal => {
                let mean = self.mean();
                let spread = (self.sum_signal2 / self.sum_weight - mean * mean).max(0.0);
                (spread * self.sum_weight2).sqrt() / self.sum_weight
            }
        }
    }
}

/// Reduces `image` through `mapping` into a profile.
///
/// # Errors
/// - [`Error::ShapeMismatch`] when the image or a correction array does not
///   match the mapping's detector shape.
/// - [`Error::InvalidConfig`] when the variance model lacks a variance array.
/// - [`Error::EmptyInput`] when every pixel is masked, dummy or not finite
///   and the policy is [`EmptyInputPolicy::Error`]. Valid pixels that merely
///   fall outside the bins yield sentinel bins instead.
pub fn reduce(
    mapping: &SparseMapping,
    image: ArrayView2<'_, f32>,
    corrections: &Corrections<'_>,
    options: &ReductionOptions,
) -> Result<Profile> {
    let shape = mapping.shape();
    if image.dim() != shape {
        return Err(Error::shape_mismatch("image", shape, image.dim()));
    }
    corrections.check_shapes(shape)?;
    if options.error_model == ErrorModel::Variance && corrections.variance.is_none() {
        return Err(Error::InvalidConfig(
            "variance error model requires a variance array".into(),
        ));
    }

    let start = Instant::now();
    let pixels = preprocess(image, corrections, options);
    let any_valid = pixels.par_iter().any(PixelValue::is_valid);
    if !any_valid && options.empty_input == EmptyInputPolicy::Error {
        return Err(Error::EmptyInput(
            "every pixel is masked, dummy or not finite".into(),
        ));
    }
    let accumulators = match options.execution {
        Execution::Sequential => accumulate_sequential(mapping, &pixels),
        Execution::BinParallel => accumulate_bin_parallel(mapping, &pixels),
        Execution::PixelParallel => accumulate_pixel_parallel(mapping, &pixels),
    };
    let profile = finalize(mapping, &accumulators, options);
    log::trace!(
        "reduced {} pixels into {} bins ({:?}) in {:.2?}",
        pixels.len(),
        accumulators.len(),
        options.execution,
        start.elapsed()
    );
    Ok(profile)
}

fn preprocess(
    image: ArrayView2<'_, f32>,
    corrections: &Corrections<'_>,
    options: &ReductionOptions,
) -> Vec<PixelValue> {
    let (rows, cols) = image.dim();
    let at = |array: Option<ArrayView2<'_, f32>>, r: usize, c: usize, default: f64| {
        array.map_or(default, |a| f64::from(a[[r, c]]))
    };
    (0..rows)
        .into_par_iter()
        .flat_map_iter(|r| {
            (0..cols).map(move |c| {
                if corrections.mask.is_some_and(|m| m.is_masked(r, c)) {
                    return PixelValue::EXCLUDED;
                }
                let raw = f64::from(image[[r, c]]);
                if raw.is_nan() || options.is_dummy(raw) {
                    return PixelValue::EXCLUDED;
                }
                let signal = raw - at(corrections.dark, r, c, 0.0);
                let norm = at(corrections.flat, r, c, 1.0)
                    * at(corrections.solid_angle, r, c, 1.0)
                    * at(corrections.polarization, r, c, 1.0);
                let mut corrected = signal / norm;
                if !corrected.is_finite() {
                    return PixelValue::EXCLUDED;
                }
                if let Some(floor) = options.floor {
                    corrected = corrected.max(floor);
                }
                let raw_variance = match options.error_model {
                    ErrorModel::Poisson => raw.max(0.0),
                    ErrorModel::Variance => at(corrections.variance, r, c, 0.0),
                    ErrorModel::NoErrors | ErrorModel::Azimuthal => 0.0,
                };
                PixelValue {
                    signal: corrected,
                    variance: raw_variance / (norm * norm),
                }
            })
        })
        .collect()
}

fn accumulate_sequential(mapping: &SparseMapping, pixels: &[PixelValue]) -> Vec<BinAccumulator> {
    let mut accumulators = vec![BinAccumulator::default(); mapping.bin_count()];
    for (p, pixel) in pixels.iter().enumerate() {
        if !pixel.is_valid() {
            continue;
        }
        for (bin, weight) in mapping.pixel_entries(p) {
            accumulators[bin].add(weight, pixel);
        }
    }
    accumulators
}

fn accumulate_bin_parallel(mapping: &SparseMapping, pixels: &[PixelValue]) -> Vec<BinAccumulator> {
    (0..mapping.bin_count())
        .into_par_iter()
        .map(|bin| {
            let mut acc = BinAccumulator::default();
            for (p, weight) in mapping.bin_entries(bin) {
                acc.add(weight, &pixels[p]);
            }
            acc
        })
        .collect()
}

fn accumulate_pixel_parallel(mapping: &SparseMapping, pixels: &[PixelValue]) -> Vec<BinAccumulator> {
    let n_bins = mapping.bin_count();
    pixels
        .par_iter()
        .enumerate()
        .with_min_len(4096)
        .fold(
            || vec![BinAccumulator::default(); n_bins],
            |mut local, (p, pixel)| {
                if pixel.is_valid() {
                    for (bin, weight) in mapping.pixel_entries(p) {
                        local[bin].add(weight, pixel);
                    }
                }
                local
            },
        )
        .reduce(
            || vec![BinAccumulator::default(); n_bins],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(&b) {
                    x.merge(y);
                }
                a
            },
        )
}

fn finalize(
    mapping: &SparseMapping,
    accumulators: &[BinAccumulator],
    options: &ReductionOptions,
) -> Profile {
    let nothing = accumulators.iter().all(|a| a.count == 0);

    let radial_centers = mapping.radial_axis().centers();
    let azimuthal_centers = mapping
        .azimuthal_axis()
        .map(azint_core::BinAxis::centers)
        .unwrap_or_default();
    let n_rad = radial_centers.len();
    let sentinel = options.empty_bins.sentinel();
    let with_sigma = options.error_model != ErrorModel::NoErrors;
    // With no contribution at all every bin is kept.
    let omit = options.empty_bins == EmptyBins::Omit && !mapping.is_2d() && !nothing;

    let mut profile = Profile {
        unit: mapping.unit(),
        radial: Vec::with_capacity(accumulators.len()),
        azimuthal: azimuthal_centers,
        intensity: Vec::with_capacity(accumulators.len()),
        sigma: with_sigma.then(|| Vec::with_capacity(accumulators.len())),
        sum_weight: Vec::with_capacity(accumulators.len()),
        sum_signal: Vec::with_capacity(accumulators.len()),
        count: Vec::with_capacity(accumulators.len()),
    };
    for (bin, acc) in accumulators.iter().enumerate() {
        let empty = acc.is_empty();
        if empty && omit {
            continue;
        }
        if !mapping.is_2d() || bin < n_rad {
            profile.radial.push(radial_centers[bin % n_rad]);
        }
        let (intensity, sigma) = if empty {
            (sentinel, f64::NAN)
        } else {
            (acc.mean(), acc.sigma(options.error_model))
        };
        profile.intensity.push(intensity);
        if let Some(s) = profile.sigma.as_mut() {
            s.push(sigma);
        }
        profile.sum_weight.push(acc.sum_weight);
        profile.sum_signal.push(acc.sum_signal);
        profile.count.push(acc.count);
    }
    profile
}
