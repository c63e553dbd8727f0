//! Bin axes: the output discretisation of radial or azimuthal space.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Strictly increasing bin edges.
///
/// Bins are half-open, `[edge_i, edge_{i+1})`: a coordinate on an inner edge
/// belongs to the higher bin and the last edge itself is out of range.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<f64>", into = "Vec<f64>"))]
pub struct BinAxis {
    edges: Vec<f64>,
}

impl TryFrom<Vec<f64>> for BinAxis {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        BinAxis::from_edges(edges)
    }
}

impl From<BinAxis> for Vec<f64> {
    fn from(axis: BinAxis) -> Self {
        axis.edges
    }
}

impl BinAxis {
    /// Builds an axis from explicit edges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinAxis`] for fewer than two edges, non-finite
    /// edges, or edges that are not strictly increasing.
    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidBinAxis(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
            return Err(Error::InvalidBinAxis(format!("non-finite edge {bad}")));
        }
        if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::InvalidBinAxis(format!(
                "edges not strictly increasing at index {}: {} -> {}",
                i,
                edges[i],
                edges[i + 1]
            )));
        }
        Ok(Self { edges })
    }

    /// Builds `bins` equal-width bins covering `[lo, hi)`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBinAxis`] when `bins == 0` or the range is
    /// empty or non-finite.
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(bins: usize, lo: f64, hi: f64) -> Result<Self> {
        if bins == 0 {
            return Err(Error::InvalidBinAxis("bin count must be positive".into()));
        }
        if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
            return Err(Error::InvalidBinAxis(format!("degenerate range [{lo}, {hi})")));
        }
        let width = (hi - lo) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        Self::from_edges(edges)
    }

    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    /// Always false: an axis has at least one bin.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Bin edges (`len() + 1` values).
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Lower bound of the first bin.
    #[must_use]
    pub fn lower(&self) -> f64 {
        self.edges[0]
    }

    /// Upper bound of the last bin (exclusive).
    #[must_use]
    pub fn upper(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Bin centres.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Width of bin `index`.
    #[inline]
    #[must_use]
    pub fn width(&self, index: usize) -> f64 {
        self.edges[index + 1] - self.edges[index]
    }

    /// Bin containing `x`, or `None` when outside `[lower, upper)`.
    #[inline]
    #[must_use]
    pub fn find(&self, x: f64) -> Option<usize> {
        if x.is_nan() || x < self.lower() || x >= self.upper() {
            return None;
        }
        Some(self.edges.partition_point(|&e| e <= x) - 1)
    }

    /// Indices of the bins intersecting the open interval `(lo, hi)`,
    /// clamped to the axis.
    #[inline]
    #[must_use]
    pub fn span(&self, lo: f64, hi: f64) -> std::ops::Range<usize> {
        if hi <= self.lower() || lo >= self.upper() || hi < lo {
            return 0..0;
        }
        let first = self.edges.partition_point(|&e| e <= lo).saturating_sub(1);
        let last = self.edges.partition_point(|&e| e < hi).min(self.len());
        first..last.max(first)
    }

    /// Length of the overlap between `[lo, hi]` and bin `index`.
    #[inline]
    #[must_use]
    pub fn overlap(&self, index: usize, lo: f64, hi: f64) -> f64 {
        (hi.min(self.edges[index + 1]) - lo.max(self.edges[index])).max(0.0)
    }
}
