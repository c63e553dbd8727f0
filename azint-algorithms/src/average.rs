//! Frame averaging for dark and flat preparation.
//!
//! Streaming reducers ([`FrameAccumulator`]) keep one running frame;
//! statistical centres ([`average_dark`]) need the whole stack and work
//! pixel by pixel across it.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

use std::fmt;
use std::str::FromStr;

use azint_core::{Error, Result};
use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;

/// Folds a stream of frames into one.
pub trait FrameReducer: Send {
    /// Reducer name.
    fn name(&self) -> &'static str;

    /// Adds one frame.
    fn add_frame(&mut self, frame: ArrayView2<'_, f32>) -> Result<()>;

    /// Frames added so far.
    fn frame_count(&self) -> usize;

    /// Combined frame.
    fn result(&self) -> Result<Array2<f32>>;
}

/// Pixel-wise running combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulation {
    /// Pixel-wise maximum.
    Max,
    /// Pixel-wise minimum.
    Min,
    /// Pixel-wise sum.
    Sum,
    /// Pixel-wise mean.
    Mean,
}

/// Streaming reducer for [`Accumulation`] kinds.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    kind: Accumulation,
    acc: Option<Array2<f64>>,
    count: usize,
}

impl FrameAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new(kind: Accumulation) -> Self {
        Self {
            kind,
            acc: None,
            count: 0,
        }
    }
}

impl FrameReducer for FrameAccumulator {
    fn name(&self) -> &'static str {
        match self.kind {
            Accumulation::Max => "max",
            Accumulation::Min => "min",
            Accumulation::Sum => "sum",
            Accumulation::Mean => "mean",
        }
    }

    fn add_frame(&mut self, frame: ArrayView2<'_, f32>) -> Result<()> {
        match self.acc.as_mut() {
            None => self.acc = Some(frame.mapv(f64::from)),
            Some(acc) => {
                if acc.dim() != frame.dim() {
                    return Err(Error::shape_mismatch("frame", acc.dim(), frame.dim()));
                }
                let kind = self.kind;
                Zip::from(acc).and(&frame).for_each(|a, &x| {
                    let x = f64::from(x);
                    *a = match kind {
                        Accumulation::Max => a.max(x),
                        Accumulation::Min => a.min(x),
                        Accumulation::Sum | Accumulation::Mean => *a + x,
                    };
                });
            }
        }
        self.count += 1;
        Ok(())
    }

    fn frame_count(&self) -> usize {
        self.count
    }

    fn result(&self) -> Result<Array2<f32>> {
        let acc = self
            .acc
            .as_ref()
            .ok_or_else(|| Error::EmptyInput("no frames to reduce".into()))?;
        let scale = match self.kind {
            Accumulation::Mean => 1.0 / self.count as f64,
            _ => 1.0,
        };
        Ok(acc.mapv(|v| (v * scale) as f32))
    }
}

/// Per-pixel centre of a frame stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CenterMethod {
    /// Arithmetic mean.
    Mean,
    /// Median (mean of the two middle values for even stacks).
    Median,
    /// Mean of the values between two quantiles, e.g. `(0.1, 0.9)`.
    /// Parsed from `"quantiles"` as [`CenterMethod::DEFAULT_QUANTILES`].
    Quantiles(f64, f64),
    /// Standard deviation, for noise maps.
    Std,
}

impl fmt::Display for CenterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CenterMethod::Mean => f.write_str("mean"),
            CenterMethod::Median => f.write_str("median"),
            CenterMethod::Quantiles(lo, hi) => write!(f, "quantiles({lo},{hi})"),
            CenterMethod::Std => f.write_str("std"),
        }
    }
}

impl FromStr for CenterMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(CenterMethod::Mean),
            "median" => Ok(CenterMethod::Median),
            "std" => Ok(CenterMethod::Std),
            "quantiles" => {
                let (lo, hi) = CenterMethod::DEFAULT_QUANTILES;
                Ok(CenterMethod::Quantiles(lo, hi))
            }
            other => Err(Error::InvalidConfig(format!("unknown center method '{other}'"))),
        }
    }
}

impl CenterMethod {
    /// Bounds used when quantiles are requested without values: the
    /// middle value of each pixel stack.
    pub const DEFAULT_QUANTILES: (f64, f64) = (0.5, 0.5);

    fn validate(self) -> Result<()> {
        if let CenterMethod::Quantiles(lo, hi) = self {
            if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) {
                return Err(Error::InvalidConfig(format!(
                    "quantiles must lie in [0, 1], got ({lo}, {hi})"
                )));
            }
        }
        Ok(())
    }

    /// Centre of `values`, which is sorted in place when needed.
    fn center(self, values: &mut [f64]) -> f64 {
        let n = values.len();
        match self {
            CenterMethod::Mean => mean(values),
            CenterMethod::Std => std_dev(values, mean(values)),
            CenterMethod::Median => {
                values.sort_unstable_by(f64::total_cmp);
                if n % 2 == 1 {
                    values[n / 2]
                } else {
                    0.5 * (values[n / 2 - 1] + values[n / 2])
                }
            }
            CenterMethod::Quantiles(a, b) => {
                values.sort_unstable_by(f64::total_cmp);
                let mut lower = (a.min(b) * n as f64).floor() as usize;
                let mut upper = ((a.max(b) * n as f64).ceil() as usize).min(n);
                if upper <= lower {
                    if upper < n {
                        upper = lower + 1;
                    } else {
                        lower = lower.saturating_sub(1);
                    }
                }
                mean(&values[lower..upper])
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Combines a stack of dark frames pixel by pixel.
///
/// With a `cutoff`, values further than `cutoff` standard deviations from the
/// centre are discarded and the survivors averaged. A single frame is
/// returned unchanged.
///
/// # Errors
/// [`Error::EmptyInput`] for an empty stack, [`Error::ShapeMismatch`] when
/// frames differ in shape, [`Error::InvalidConfig`] for bad quantiles.
pub fn average_dark(
    frames: &[ArrayView2<'_, f32>],
    center: CenterMethod,
    cutoff: Option<f64>,
) -> Result<Array2<f32>> {
    let first = frames
        .first()
        .ok_or_else(|| Error::EmptyInput("no frames to average".into()))?;
    center.validate()?;
    let shape = first.dim();
    if let Some(bad) = frames.iter().find(|f| f.dim() != shape) {
        return Err(Error::shape_mismatch("frame", shape, bad.dim()));
    }
    if frames.len() == 1 {
        return Ok(first.to_owned());
    }
    let cutoff = cutoff.filter(|c| *c > 0.0);
    let (rows, cols) = shape;

    let values: Vec<f32> = (0..rows * cols)
        .into_par_iter()
        .map_init(
            || Vec::with_capacity(frames.len()),
            |stack: &mut Vec<f64>, p| {
                let (r, c) = (p / cols, p % cols);
                stack.clear();
                stack.extend(frames.iter().map(|f| f64::from(f[[r, c]])));
                let Some(cutoff) = cutoff else {
                    return center.center(stack) as f32;
                };
                let spread = std_dev(stack, mean(stack));
                let middle = center.center(stack);
                let (kept, n) = stack
                    .iter()
                    .filter(|&&v| {
                        // 0/0 for a zero spread: keep.
                        let score = (v - middle).abs() / spread;
                        score.is_nan() || score <= cutoff
                    })
                    .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
                (kept / n.max(1) as f64) as f32
            },
        )
        .collect();
    Array2::from_shape_vec(shape, values)
        .map_err(|e| Error::InvalidConfig(format!("cannot assemble averaged frame: {e}")))
}

/// Flat field ready for division: optionally dark-subtracted, with
/// non-positive or non-finite pixels replaced by 1.
#[must_use]
pub fn prepare_flat(flat: ArrayView2<'_, f32>, dark: Option<ArrayView2<'_, f32>>) -> Array2<f32> {
    let mut out = flat.to_owned();
    if let Some(dark) = dark {
        Zip::from(&mut out).and(&dark).for_each(|f, &d| *f -= d);
    }
    out.mapv_inplace(|v| if v.is_finite() && v > 0.0 { v } else { 1.0 });
    out
}
