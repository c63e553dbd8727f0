//! Sparse pixel → bin mapping.
//!
//! A [`SparseMapping`] stores every non-zero split weight twice, in
//! compressed-row form: pixel-major (which bins does pixel `p` feed) and
//! bin-major (which pixels feed bin `b`). The mapping depends only on the
//! geometry, the splitting method, the bin axes and the static mask, so it is
//! built once and reused for every frame.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

use std::hash::{Hash, Hasher};
use std::time::Instant;

use azint_core::{
    BinAxis, CornerGrid, Error, Geometry, Mask, PixelFootprint, RadialUnit, Result, SplitMethod,
};
use rayon::prelude::*;

use crate::splitting::{find_chi, BBoxSplit, NoSplit, PixelSplitter, PolygonSplit};

const FULL_CIRCLE: f64 = 360.0;

/// Requested discretisation of one output axis.
///
/// Kept unresolved so it can take part in cache keys: `Uniform` without a
/// range resolves to the data extent only when the mapping is built.
#[derive(Debug, Clone)]
pub enum AxisSpec {
    /// `bins` equal-width bins over `range`, or over the data extent.
    Uniform {
        /// Number of bins.
        bins: usize,
        /// Explicit `[lo, hi)`.
        range: Option<(f64, f64)>,
    },
    /// Caller-supplied edges.
    Edges(BinAxis),
}

impl AxisSpec {
    /// Uniform bins over the data extent.
    #[must_use]
    pub fn bins(bins: usize) -> Self {
        AxisSpec::Uniform { bins, range: None }
    }

    /// Uniform bins over an explicit range.
    #[must_use]
    pub fn uniform(bins: usize, lo: f64, hi: f64) -> Self {
        AxisSpec::Uniform {
            bins,
            range: Some((lo, hi)),
        }
    }

    /// Resolves the axis, calling `extent` only when a range is needed.
    fn resolve(&self, extent: impl FnOnce() -> (f64, f64)) -> Result<BinAxis> {
        match self {
            AxisSpec::Edges(axis) => Ok(axis.clone()),
            AxisSpec::Uniform {
                bins,
                range: Some((lo, hi)),
            } => BinAxis::uniform(*bins, *lo, *hi),
            AxisSpec::Uniform { bins, range: None } => {
                if *bins == 0 {
                    return Err(Error::InvalidBinAxis("bin count must be positive".into()));
                }
                let (lo, hi) = extent();
                BinAxis::uniform(*bins, lo, nudge_upper(lo, hi))
            }
        }
    }
}

impl PartialEq for AxisSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                AxisSpec::Uniform { bins: a, range: ra },
                AxisSpec::Uniform { bins: b, range: rb },
            ) => a == b && range_bits(*ra) == range_bits(*rb),
            (AxisSpec::Edges(a), AxisSpec::Edges(b)) => {
                a.edges().len() == b.edges().len()
                    && a.edges()
                        .iter()
                        .zip(b.edges())
                        .all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

impl Eq for AxisSpec {}

impl Hash for AxisSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            AxisSpec::Uniform { bins, range } => {
                0u8.hash(state);
                bins.hash(state);
                range_bits(*range).hash(state);
            }
            AxisSpec::Edges(axis) => {
                1u8.hash(state);
                for edge in axis.edges() {
                    edge.to_bits().hash(state);
                }
            }
        }
    }
}

pub(crate) fn range_bits(range: Option<(f64, f64)>) -> Option<(u64, u64)> {
    range.map(|(lo, hi)| (lo.to_bits(), hi.to_bits()))
}

/// Moves `hi` just past the data maximum so the maximum falls inside the
/// last half-open bin.
fn nudge_upper(lo: f64, hi: f64) -> f64 {
    let scale = hi.abs().max(lo.abs()).max(hi - lo).max(f64::MIN_POSITIVE);
    let nudged = hi + scale * 1e-9;
    if nudged > hi {
        nudged
    } else {
        hi + f64::EPSILON.max(scale * f64::EPSILON)
    }
}

/// Pixel → bin weights in both pixel-major and bin-major compressed form.
#[derive(Debug, Clone)]
pub struct SparseMapping {
    shape: (usize, usize),
    method: SplitMethod,
    unit: RadialUnit,
    radial: BinAxis,
    azimuthal: Option<BinAxis>,
    pixel_ptr: Vec<usize>,
    pixel_bins: Vec<u32>,
    pixel_weights: Vec<f32>,
    bin_ptr: Vec<usize>,
    bin_pixels: Vec<u32>,
    bin_weights: Vec<f32>,
}

impl SparseMapping {
    /// Assembles a mapping from its pixel-major form; derives the bin-major
    /// form by a counting sort.
    #[allow(clippy::too_many_arguments)]
    fn from_pixel_major(
        shape: (usize, usize),
        method: SplitMethod,
        unit: RadialUnit,
        radial: BinAxis,
        azimuthal: Option<BinAxis>,
        pixel_ptr: Vec<usize>,
        pixel_bins: Vec<u32>,
        pixel_weights: Vec<f32>,
    ) -> Self {
        let n_bins = radial.len() * azimuthal.as_ref().map_or(1, BinAxis::len);
        let mut bin_ptr = vec![0usize; n_bins + 1];
        for &bin in &pixel_bins {
            bin_ptr[bin as usize + 1] += 1;
        }
        for i in 0..n_bins {
            bin_ptr[i + 1] += bin_ptr[i];
        }
        let mut cursor = bin_ptr.clone();
        let mut bin_pixels = vec![0u32; pixel_bins.len()];
        let mut bin_weights = vec![0f32; pixel_bins.len()];
        for pixel in 0..pixel_ptr.len() - 1 {
            for k in pixel_ptr[pixel]..pixel_ptr[pixel + 1] {
                let bin = pixel_bins[k] as usize;
                let slot = cursor[bin];
                bin_pixels[slot] = pixel as u32;
                bin_weights[slot] = pixel_weights[k];
                cursor[bin] += 1;
            }
        }
        Self {
            shape,
            method,
            unit,
            radial,
            azimuthal,
            pixel_ptr,
            pixel_bins,
            pixel_weights,
            bin_ptr,
            bin_pixels,
            bin_weights,
        }
    }

    /// Detector shape the mapping was built for.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of detector pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.pixel_ptr.len() - 1
    }

    /// Number of output bins.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.bin_ptr.len() - 1
    }

    /// Number of stored weights.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.pixel_bins.len()
    }

    /// Splitting method used.
    #[must_use]
    pub fn method(&self) -> SplitMethod {
        self.method
    }

    /// Radial unit of the axes.
    #[must_use]
    pub fn unit(&self) -> RadialUnit {
        self.unit
    }

    /// Resolved radial axis.
    #[must_use]
    pub fn radial_axis(&self) -> &BinAxis {
        &self.radial
    }

    /// Resolved azimuthal axis for 2-D mappings.
    #[must_use]
    pub fn azimuthal_axis(&self) -> Option<&BinAxis> {
        self.azimuthal.as_ref()
    }

    /// Whether bins are radial × azimuthal.
    #[must_use]
    pub fn is_2d(&self) -> bool {
        self.azimuthal.is_some()
    }

    /// `(bin, weight)` pairs of flat pixel index `pixel`.
    pub fn pixel_entries(&self, pixel: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let range = self.pixel_ptr[pixel]..self.pixel_ptr[pixel + 1];
        self.pixel_bins[range.clone()]
            .iter()
            .zip(&self.pixel_weights[range])
            .map(|(&b, &w)| (b as usize, w))
    }

    /// `(pixel, weight)` pairs feeding flat bin index `bin`.
    pub fn bin_entries(&self, bin: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let range = self.bin_ptr[bin]..self.bin_ptr[bin + 1];
        self.bin_pixels[range.clone()]
            .iter()
            .zip(&self.bin_weights[range])
            .map(|(&p, &w)| (p as usize, w))
    }

    /// Total weight pixel `pixel` distributes (1 when fully inside the axes).
    #[must_use]
    pub fn pixel_weight_sum(&self, pixel: usize) -> f64 {
        self.pixel_entries(pixel).map(|(_, w)| f64::from(w)).sum()
    }

    /// Total weight received by every bin.
    #[must_use]
    pub fn bin_weight_sums(&self) -> Vec<f64> {
        (0..self.bin_count())
            .map(|b| self.bin_entries(b).map(|(_, w)| f64::from(w)).sum())
            .collect()
    }

    /// Bins that no pixel reaches.
    #[must_use]
    pub fn empty_bins(&self) -> Vec<usize> {
        self.bin_ptr
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] == w[1])
            .map(|(b, _)| b)
            .collect()
    }

    /// Approximate heap footprint in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        (self.pixel_ptr.len() + self.bin_ptr.len()) * std::mem::size_of::<usize>()
            + 2 * self.nnz() * (std::mem::size_of::<u32>() + std::mem::size_of::<f32>())
    }
}

/// Builds [`SparseMapping`]s for one geometry.
///
/// ```ignore
/// let mapping = MappingBuilder::new(&geometry)
///     .with_method(SplitMethod::Polygon)
///     .with_unit(RadialUnit::QNm)
///     .with_mask(Some(&mask))
///     .build_1d(&AxisSpec::bins(1000))?;
/// ```
#[derive(Debug, Clone)]
pub struct MappingBuilder<'a> {
    geometry: &'a Geometry,
    method: SplitMethod,
    unit: RadialUnit,
    mask: Option<&'a Mask>,
    azimuth_range: Option<(f64, f64)>,
}

/// Entries produced for one detector row.
#[derive(Default)]
struct RowBlock {
    lengths: Vec<usize>,
    bins: Vec<u32>,
    weights: Vec<f32>,
}

impl<'a> MappingBuilder<'a> {
    /// Creates a builder with the default method and unit.
    #[must_use]
    pub fn new(geometry: &'a Geometry) -> Self {
        Self {
            geometry,
            method: SplitMethod::default(),
            unit: RadialUnit::default(),
            mask: None,
            azimuth_range: None,
        }
    }

    /// Sets the splitting method.
    #[must_use]
    pub fn with_method(mut self, method: SplitMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the radial unit.
    #[must_use]
    pub fn with_unit(mut self, unit: RadialUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Excludes masked pixels from the mapping.
    #[must_use]
    pub fn with_mask(mut self, mask: Option<&'a Mask>) -> Self {
        self.mask = mask;
        self
    }

    /// Restricts 1-D mappings to pixels whose centre χ lies in `[lo, hi)`.
    #[must_use]
    pub fn with_azimuth_range(mut self, range: Option<(f64, f64)>) -> Self {
        self.azimuth_range = range;
        self
    }

    fn check_mask(&self) -> Result<()> {
        if let Some(mask) = self.mask {
            if mask.shape() != self.geometry.shape() {
                return Err(Error::shape_mismatch("mask", self.geometry.shape(), mask.shape()));
            }
        }
        if let Some((lo, hi)) = self.azimuth_range {
            if !(lo.is_finite() && hi.is_finite()) || hi <= lo || hi - lo > FULL_CIRCLE {
                return Err(Error::InvalidConfig(format!(
                    "azimuth range ({lo}, {hi}) must be increasing and at most 360 degrees wide"
                )));
            }
        }
        Ok(())
    }

    /// Builds a radial mapping.
    pub fn build_1d(&self, radial: &AxisSpec) -> Result<SparseMapping> {
        self.check_mask()?;
        let start = Instant::now();
        let footprints = self.footprints();
        let chi_window = match self.azimuth_range {
            Some((lo, hi)) => Some(BinAxis::uniform(1, lo, hi)?),
            None => None,
        };
        let selected = |row: usize, col: usize, fp: &PixelFootprint| {
            !self.is_masked(row, col)
                && match &chi_window {
                    Some(window) => find_chi(window, fp.center.chi).is_some(),
                    None => true,
                }
        };
        let radial = radial.resolve(|| footprints.radial_extent(self.method, &selected))?;

        let (ptr, bins, weights) = match self.method {
            SplitMethod::NoSplit => self.assemble(&footprints, &NoSplit, &selected, |s, fp, out| {
                s.split_radial(fp, &radial, out);
            }),
            SplitMethod::BBox => self.assemble(&footprints, &BBoxSplit, &selected, |s, fp, out| {
                s.split_radial(fp, &radial, out);
            }),
            SplitMethod::Polygon => {
                self.assemble(&footprints, &PolygonSplit, &selected, |s, fp, out| {
                    s.split_radial(fp, &radial, out);
                })
            }
        };
        let mapping = SparseMapping::from_pixel_major(
            self.geometry.shape(),
            self.method,
            self.unit,
            radial,
            None,
            ptr,
            bins,
            weights,
        );
        log::debug!(
            "built {} 1-D mapping: {} bins, {} weights in {:.2?}",
            self.method,
            mapping.bin_count(),
            mapping.nnz(),
            start.elapsed()
        );
        Ok(mapping)
    }

    /// Builds a radial × azimuthal mapping. `azimuthal` is in degrees and
    /// defaults to the full circle `[-180, 180)` when given as bare bins.
    pub fn build_2d(&self, radial: &AxisSpec, azimuthal: &AxisSpec) -> Result<SparseMapping> {
        self.check_mask()?;
        let start = Instant::now();
        let footprints = self.footprints();
        let selected = |row: usize, col: usize, _: &PixelFootprint| !self.is_masked(row, col);
        let radial = radial.resolve(|| footprints.radial_extent(self.method, &selected))?;
        let azimuthal = match azimuthal {
            AxisSpec::Uniform { bins, range: None } => BinAxis::uniform(*bins, -180.0, 180.0)?,
            spec => spec.resolve(|| (-180.0, 180.0))?,
        };
        let span = azimuthal.upper() - azimuthal.lower();
        if span > FULL_CIRCLE * (1.0 + 1e-9) {
            return Err(Error::InvalidBinAxis(format!(
                "azimuthal axis spans {span} degrees, more than a full circle"
            )));
        }

        let (ptr, bins, weights) = match self.method {
            SplitMethod::NoSplit => self.assemble(&footprints, &NoSplit, &selected, |s, fp, out| {
                s.split_2d(fp, &radial, &azimuthal, out);
            }),
            SplitMethod::BBox => self.assemble(&footprints, &BBoxSplit, &selected, |s, fp, out| {
                s.split_2d(fp, &radial, &azimuthal, out);
            }),
            SplitMethod::Polygon => {
                self.assemble(&footprints, &PolygonSplit, &selected, |s, fp, out| {
                    s.split_2d(fp, &radial, &azimuthal, out);
                })
            }
        };
        let mapping = SparseMapping::from_pixel_major(
            self.geometry.shape(),
            self.method,
            self.unit,
            radial,
            Some(azimuthal),
            ptr,
            bins,
            weights,
        );
        log::debug!(
            "built {} 2-D mapping: {} bins, {} weights in {:.2?}",
            self.method,
            mapping.bin_count(),
            mapping.nnz(),
            start.elapsed()
        );
        Ok(mapping)
    }

    #[inline]
    fn is_masked(&self, row: usize, col: usize) -> bool {
        self.mask.is_some_and(|m| m.is_masked(row, col))
    }

    fn footprints(&self) -> Footprints<'a> {
        let corners = self
            .method
            .uses_corners()
            .then(|| self.geometry.corner_grid(self.unit));
        Footprints {
            geometry: self.geometry,
            unit: self.unit,
            corners,
        }
    }

    /// Runs the splitter over all rows in parallel and concatenates the
    /// per-row blocks in pixel order.
    fn assemble<S, Sel, F>(
        &self,
        footprints: &Footprints<'_>,
        splitter: &S,
        selected: &Sel,
        split: F,
    ) -> (Vec<usize>, Vec<u32>, Vec<f32>)
    where
        S: PixelSplitter,
        Sel: Fn(usize, usize, &PixelFootprint) -> bool + Sync,
        F: Fn(&S, &PixelFootprint, &mut Vec<(u32, f32)>) + Sync,
    {
        let (rows, cols) = self.geometry.shape();
        let blocks: Vec<RowBlock> = (0..rows)
            .into_par_iter()
            .map(|row| {
                let mut block = RowBlock {
                    lengths: Vec::with_capacity(cols),
                    ..RowBlock::default()
                };
                let mut scratch = Vec::with_capacity(16);
                for col in 0..cols {
                    let fp = footprints.get(row, col);
                    scratch.clear();
                    if selected(row, col, &fp) {
                        split(splitter, &fp, &mut scratch);
                    }
                    block.lengths.push(scratch.len());
                    for &(bin, weight) in &scratch {
                        block.bins.push(bin);
                        block.weights.push(weight);
                    }
                }
                block
            })
            .collect();

        let nnz: usize = blocks.iter().map(|b| b.bins.len()).sum();
        let mut ptr = Vec::with_capacity(rows * cols + 1);
        let mut bins = Vec::with_capacity(nnz);
        let mut weights = Vec::with_capacity(nnz);
        ptr.push(0);
        for block in blocks {
            for len in block.lengths {
                let last = ptr[ptr.len() - 1];
                ptr.push(last + len);
            }
            bins.extend(block.bins);
            weights.extend(block.weights);
        }
        (ptr, bins, weights)
    }
}

/// Pixel footprints computed on demand from shared corners.
struct Footprints<'a> {
    geometry: &'a Geometry,
    unit: RadialUnit,
    corners: Option<CornerGrid>,
}

impl Footprints<'_> {
    #[inline]
    fn get(&self, row: usize, col: usize) -> PixelFootprint {
        let center = self.geometry.position(row, col, self.unit);
        match &self.corners {
            Some(grid) => grid.footprint(row, col, center),
            None => PixelFootprint::from_corners(center, [center; 4]),
        }
    }

    /// Radial extent of the selected pixels: corner extent when splitting,
    /// centre extent otherwise. Falls back to all pixels when nothing is
    /// selected, so the axis is still well defined.
    fn radial_extent<Sel>(&self, method: SplitMethod, selected: &Sel) -> (f64, f64)
    where
        Sel: Fn(usize, usize, &PixelFootprint) -> bool + Sync,
    {
        let (rows, cols) = self.geometry.shape();
        let extent_of = |filter: bool| {
            (0..rows)
                .into_par_iter()
                .map(|row| {
                    let mut lo = f64::INFINITY;
                    let mut hi = f64::NEG_INFINITY;
                    for col in 0..cols {
                        let fp = self.get(row, col);
                        if filter && !selected(row, col, &fp) {
                            continue;
                        }
                        let (a, b) = if method.uses_corners() {
                            fp.radial_range()
                        } else {
                            (fp.center.radial, fp.center.radial)
                        };
                        lo = lo.min(a);
                        hi = hi.max(b);
                    }
                    (lo, hi)
                })
                .reduce(
                    || (f64::INFINITY, f64::NEG_INFINITY),
                    |(a, b), (c, d)| (a.min(c), b.max(d)),
                )
        };
        let (lo, hi) = extent_of(true);
        if lo <= hi {
            (lo, hi)
        } else {
            log::warn!("no pixel selected, radial range taken over the whole detector");
            extent_of(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use azint_core::GeometryParams;
    use ndarray::Array2;
    use std::collections::hash_map::DefaultHasher;

    fn geometry(rows: usize, cols: usize) -> Geometry {
        GeometryParams::new()
            .with_shape(rows, cols)
            .with_beam_center(rows as f64 / 2.0, cols as f64 / 2.0)
            .build()
            .unwrap()
    }

    fn hash_of(spec: &AxisSpec) -> u64 {
        let mut h = DefaultHasher::new();
        spec.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_axis_spec_identity() {
        let a = AxisSpec::uniform(10, 0.0, 1.0);
        let b = AxisSpec::uniform(10, 0.0, 1.0);
        let c = AxisSpec::bins(10);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
        let edges = AxisSpec::Edges(BinAxis::from_edges(vec![0.0, 0.5, 1.0]).unwrap());
        assert_ne!(a, edges);
        assert_eq!(edges.clone(), edges);
    }

    #[test]
    fn test_nudged_extent_keeps_maximum_inside() {
        for (lo, hi) in [(0.0, 1.0), (3.2, 7.9), (-1.0, -0.5)] {
            let axis = BinAxis::uniform(4, lo, nudge_upper(lo, hi)).unwrap();
            assert_eq!(axis.find(hi), Some(3));
        }
    }

    #[test]
    fn test_no_split_every_pixel_once() {
        let geometry = geometry(16, 12);
        let mapping = MappingBuilder::new(&geometry)
            .with_method(SplitMethod::NoSplit)
            .build_1d(&AxisSpec::bins(20))
            .unwrap();
        assert_eq!(mapping.nnz(), 16 * 12);
        assert_eq!(mapping.pixel_count(), 16 * 12);
        assert_eq!(mapping.bin_count(), 20);
        for p in 0..mapping.pixel_count() {
            assert_eq!(mapping.pixel_entries(p).count(), 1);
        }
    }

    #[test]
    fn test_both_layouts_agree() {
        let geometry = geometry(9, 11);
        let mapping = MappingBuilder::new(&geometry)
            .with_method(SplitMethod::Polygon)
            .build_2d(&AxisSpec::bins(6), &AxisSpec::bins(8))
            .unwrap();
        let mut by_pixel = Array2::<f64>::zeros((mapping.pixel_count(), mapping.bin_count()));
        for p in 0..mapping.pixel_count() {
            for (b, w) in mapping.pixel_entries(p) {
                by_pixel[[p, b]] += f64::from(w);
            }
        }
        for b in 0..mapping.bin_count() {
            for (p, w) in mapping.bin_entries(b) {
                by_pixel[[p, b]] -= f64::from(w);
            }
        }
        assert!(by_pixel.iter().all(|v| v.abs() < 1e-7));
        let total: f64 = mapping.bin_weight_sums().iter().sum();
        assert_relative_eq!(total, (9 * 11) as f64, epsilon = 1e-3);
    }

    #[test]
    fn test_mask_removes_pixels() {
        let geometry = geometry(4, 4);
        let mut data = Array2::from_elem((4, 4), false);
        data[[0, 0]] = true;
        data[[3, 2]] = true;
        let mask = Mask::new(data);
        let mapping = MappingBuilder::new(&geometry)
            .with_method(SplitMethod::BBox)
            .with_mask(Some(&mask))
            .build_1d(&AxisSpec::bins(4))
            .unwrap();
        assert_eq!(mapping.pixel_entries(0).count(), 0);
        assert_eq!(mapping.pixel_entries(3 * 4 + 2).count(), 0);
        assert!(mapping.pixel_entries(5).count() > 0);
    }

    #[test]
    fn test_mask_shape_checked() {
        let geometry = geometry(4, 4);
        let mask = Mask::empty((4, 5));
        let result = MappingBuilder::new(&geometry)
            .with_mask(Some(&mask))
            .build_1d(&AxisSpec::bins(4));
        assert!(matches!(result, Err(Error::ShapeMismatch { name: "mask", .. })));
    }

    #[test]
    fn test_out_of_range_bins_are_empty() {
        let geometry = geometry(8, 8);
        let mapping = MappingBuilder::new(&geometry)
            .with_method(SplitMethod::NoSplit)
            .with_unit(RadialUnit::RMm)
            .build_1d(&AxisSpec::uniform(4, 10.0, 20.0))
            .unwrap();
        assert_eq!(mapping.nnz(), 0);
        assert_eq!(mapping.empty_bins(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_default_azimuth_is_full_circle() {
        let geometry = geometry(8, 8);
        let mapping = MappingBuilder::new(&geometry)
            .with_method(SplitMethod::NoSplit)
            .build_2d(&AxisSpec::bins(4), &AxisSpec::bins(8))
            .unwrap();
        let azimuthal = mapping.azimuthal_axis().unwrap();
        assert_eq!(azimuthal.lower(), -180.0);
        assert_eq!(azimuthal.upper(), 180.0);
        assert_eq!(azimuthal.edges().len(), 9);
        assert_eq!(mapping.nnz(), 64);

        // A full circle given explicitly is accepted as well.
        assert!(MappingBuilder::new(&geometry)
            .build_2d(&AxisSpec::bins(4), &AxisSpec::uniform(8, 0.0, 360.0))
            .is_ok());
    }

    #[test]
    fn test_rejects_overwide_azimuth() {
        let geometry = geometry(4, 4);
        let result = MappingBuilder::new(&geometry)
            .build_2d(&AxisSpec::bins(4), &AxisSpec::uniform(4, -180.0, 270.0));
        assert!(matches!(result, Err(Error::InvalidBinAxis(_))));
        let result = MappingBuilder::new(&geometry)
            .with_azimuth_range(Some((10.0, 5.0)))
            .build_1d(&AxisSpec::bins(4));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
