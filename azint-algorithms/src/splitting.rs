//! Pixel splitting: how one pixel's unit weight is shared between bins.
//!
//! Each splitter writes `(flat bin index, weight)` pairs for a single
//! pixel. 2-D bin indices are azimuth-major (`azim * radial.len() + rad`).
//! Azimuthal intervals are tried at shifts of ±360° so a pixel straddling
//! the χ seam reaches bins on both sides of it.
#![allow(
    clippy::cast_possible_truncation,
    clippy::doc_markdown,
    clippy::module_name_repetitions
)]

use azint_core::{BinAxis, PixelFootprint};

use crate::polygon::Polygon;

/// Shifts applied to χ intervals before intersecting the azimuthal axis.
const CHI_SHIFTS: [f64; 3] = [0.0, -360.0, 360.0];

/// Relative area below which a footprint counts as degenerate.
const DEGENERATE_AREA: f64 = 1e-12;

/// Distributes one pixel over bins.
pub trait PixelSplitter: Send + Sync {
    /// Method name.
    fn name(&self) -> &'static str;

    /// Splits over a radial axis. Appends to `out`.
    fn split_radial(&self, footprint: &PixelFootprint, radial: &BinAxis, out: &mut Vec<(u32, f32)>);

    /// Splits over a radial × azimuthal grid. Appends to `out`.
    fn split_2d(
        &self,
        footprint: &PixelFootprint,
        radial: &BinAxis,
        azimuthal: &BinAxis,
        out: &mut Vec<(u32, f32)>,
    );
}

/// Whole pixel to the bin holding its centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSplit;

/// Split proportionally to the overlap of the corner bounding box.
#[derive(Debug, Clone, Copy, Default)]
pub struct BBoxSplit;

/// Split proportionally to the exact overlap area of the pixel quadrilateral.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonSplit;

#[inline]
fn push(out: &mut Vec<(u32, f32)>, bin: usize, weight: f64) {
    if weight > 0.0 {
        out.push((bin as u32, weight as f32));
    }
}

/// Azimuthal bin of `chi`, trying the seam shifts.
#[inline]
pub fn find_chi(azimuthal: &BinAxis, chi: f64) -> Option<usize> {
    CHI_SHIFTS.iter().find_map(|s| azimuthal.find(chi + s))
}

/// Calls `f(bin, fraction)` for every bin overlapped by `[lo, hi]`.
/// A zero-width interval falls back to the bin containing `point`.
fn for_each_fraction(axis: &BinAxis, lo: f64, hi: f64, point: f64, mut f: impl FnMut(usize, f64)) {
    let width = hi - lo;
    if width > 0.0 && width.is_finite() {
        for i in axis.span(lo, hi) {
            let fraction = axis.overlap(i, lo, hi) / width;
            if fraction > 0.0 {
                f(i, fraction);
            }
        }
    } else if let Some(i) = axis.find(point) {
        f(i, 1.0);
    }
}

/// Same as [`for_each_fraction`] on the periodic χ axis.
fn for_each_chi_fraction(
    azimuthal: &BinAxis,
    lo: f64,
    hi: f64,
    point: f64,
    mut f: impl FnMut(usize, f64),
) {
    let width = hi - lo;
    if width > 0.0 && width.is_finite() {
        for shift in CHI_SHIFTS {
            let (a, b) = (lo + shift, hi + shift);
            for i in azimuthal.span(a, b) {
                let fraction = azimuthal.overlap(i, a, b) / width;
                if fraction > 0.0 {
                    f(i, fraction);
                }
            }
        }
    } else if let Some(i) = find_chi(azimuthal, point) {
        f(i, 1.0);
    }
}

/// χ interval of a footprint; the whole circle around the beam centre.
fn chi_interval(footprint: &PixelFootprint) -> (f64, f64) {
    if footprint.contains_beam {
        (-180.0, 180.0)
    } else {
        footprint.chi_range()
    }
}

fn quad(footprint: &PixelFootprint) -> Polygon {
    Polygon::from_quad(footprint.corners.map(|c| (c.radial, c.chi)))
}

/// Polygon area when it is large enough to split by.
fn usable_area(polygon: &Polygon) -> Option<f64> {
    let (x0, x1, y0, y1) = polygon.bounds();
    let area = polygon.area();
    let bbox = (x1 - x0) * (y1 - y0);
    if !area.is_normal() || area <= DEGENERATE_AREA * bbox {
        None
    } else {
        Some(area)
    }
}

impl PixelSplitter for NoSplit {
    fn name(&self) -> &'static str {
        "no_split"
    }

    fn split_radial(&self, footprint: &PixelFootprint, radial: &BinAxis, out: &mut Vec<(u32, f32)>) {
        if let Some(r) = radial.find(footprint.center.radial) {
            push(out, r, 1.0);
        }
    }

    fn split_2d(
        &self,
        footprint: &PixelFootprint,
        radial: &BinAxis,
        azimuthal: &BinAxis,
        out: &mut Vec<(u32, f32)>,
    ) {
        let center = footprint.center;
        if let (Some(r), Some(a)) = (radial.find(center.radial), find_chi(azimuthal, center.chi)) {
            push(out, a * radial.len() + r, 1.0);
        }
    }
}

impl PixelSplitter for BBoxSplit {
    fn name(&self) -> &'static str {
        "bbox"
    }

    fn split_radial(&self, footprint: &PixelFootprint, radial: &BinAxis, out: &mut Vec<(u32, f32)>) {
        let (lo, hi) = footprint.radial_range();
        for_each_fraction(radial, lo, hi, footprint.center.radial, |r, w| push(out, r, w));
    }

    fn split_2d(
        &self,
        footprint: &PixelFootprint,
        radial: &BinAxis,
        azimuthal: &BinAxis,
        out: &mut Vec<(u32, f32)>,
    ) {
        let (r_lo, r_hi) = footprint.radial_range();
        let (c_lo, c_hi) = chi_interval(footprint);
        let n_rad = radial.len();
        let center = footprint.center;
        for_each_chi_fraction(azimuthal, c_lo, c_hi, center.chi, |a, wa| {
            for_each_fraction(radial, r_lo, r_hi, center.radial, |r, wr| {
                push(out, a * n_rad + r, wa * wr);
            });
        });
    }
}

impl PixelSplitter for PolygonSplit {
    fn name(&self) -> &'static str {
        "polygon"
    }

    fn split_radial(&self, footprint: &PixelFootprint, radial: &BinAxis, out: &mut Vec<(u32, f32)>) {
        if footprint.contains_beam {
            return BBoxSplit.split_radial(footprint, radial, out);
        }
        let polygon = quad(footprint);
        let Some(area) = usable_area(&polygon) else {
            return BBoxSplit.split_radial(footprint, radial, out);
        };
        let (x0, x1, _, _) = polygon.bounds();
        let edges = radial.edges();
        for r in radial.span(x0, x1) {
            let piece = polygon.clip_x(edges[r], edges[r + 1]).area();
            push(out, r, piece / area);
        }
    }

    fn split_2d(
        &self,
        footprint: &PixelFootprint,
        radial: &BinAxis,
        azimuthal: &BinAxis,
        out: &mut Vec<(u32, f32)>,
    ) {
        if footprint.contains_beam {
            return BBoxSplit.split_2d(footprint, radial, azimuthal, out);
        }
        let polygon = quad(footprint);
        let Some(area) = usable_area(&polygon) else {
            return BBoxSplit.split_2d(footprint, radial, azimuthal, out);
        };
        let (x0, x1, y0, y1) = polygon.bounds();
        let r_edges = radial.edges();
        let a_edges = azimuthal.edges();
        let n_rad = radial.len();
        for shift in CHI_SHIFTS {
            let chi_bins = azimuthal.span(y0 + shift, y1 + shift);
            if chi_bins.is_empty() {
                continue;
            }
            let shifted = polygon.shifted_y(shift);
            for r in radial.span(x0, x1) {
                let strip = shifted.clip_x(r_edges[r], r_edges[r + 1]);
                if strip.is_empty() {
                    continue;
                }
                for a in chi_bins.clone() {
                    let piece = strip.clip_y(a_edges[a], a_edges[a + 1]).area();
                    push(out, a * n_rad + r, piece / area);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use azint_core::{GeometryParams, RadialUnit, ScatteringPosition};

    fn total(entries: &[(u32, f32)]) -> f64 {
        entries.iter().map(|&(_, w)| f64::from(w)).sum()
    }

    fn square(r0: f64, r1: f64, c0: f64, c1: f64) -> PixelFootprint {
        let center = ScatteringPosition::new(0.5 * (r0 + r1), 0.5 * (c0 + c1));
        PixelFootprint::from_corners(
            center,
            [
                ScatteringPosition::new(r0, c0),
                ScatteringPosition::new(r1, c0),
                ScatteringPosition::new(r1, c1),
                ScatteringPosition::new(r0, c1),
            ],
        )
    }

    #[test]
    fn test_no_split_uses_centre() {
        let axis = BinAxis::uniform(4, 0.0, 4.0).unwrap();
        let mut out = Vec::new();
        NoSplit.split_radial(&square(0.8, 1.6, 0.0, 1.0), &axis, &mut out);
        assert_eq!(out, vec![(1, 1.0)]);

        out.clear();
        NoSplit.split_radial(&square(5.0, 6.0, 0.0, 1.0), &axis, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_bbox_fractions() {
        let axis = BinAxis::uniform(4, 0.0, 4.0).unwrap();
        let mut out = Vec::new();
        BBoxSplit.split_radial(&square(0.5, 2.5, 0.0, 1.0), &axis, &mut out);
        assert_eq!(out.len(), 3);
        assert_relative_eq!(f64::from(out[0].1), 0.25, epsilon = 1e-6);
        assert_relative_eq!(f64::from(out[1].1), 0.5, epsilon = 1e-6);
        assert_relative_eq!(total(&out), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_polygon_matches_bbox_for_rectangles() {
        let axis = BinAxis::uniform(8, 0.0, 2.0).unwrap();
        let footprint = square(0.3, 1.1, 10.0, 11.0);
        let mut bbox = Vec::new();
        let mut poly = Vec::new();
        BBoxSplit.split_radial(&footprint, &axis, &mut bbox);
        PolygonSplit.split_radial(&footprint, &axis, &mut poly);
        assert_eq!(bbox.len(), poly.len());
        for (a, b) in bbox.iter().zip(&poly) {
            assert_eq!(a.0, b.0);
            assert_relative_eq!(a.1, b.1, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_partial_coverage_loses_weight() {
        let axis = BinAxis::uniform(2, 0.0, 1.0).unwrap();
        let mut out = Vec::new();
        PolygonSplit.split_radial(&square(0.5, 1.5, 0.0, 1.0), &axis, &mut out);
        assert_relative_eq!(total(&out), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_seam_pixel_splits_across_both_ends() {
        let radial = BinAxis::uniform(1, 0.0, 10.0).unwrap();
        let azimuthal = BinAxis::uniform(36, -180.0, 180.0).unwrap();
        // Unwrapped χ interval [170, 190] wraps onto [-180, -170].
        let footprint = square(1.0, 2.0, 170.0, 190.0);
        for splitter in [&BBoxSplit as &dyn PixelSplitter, &PolygonSplit] {
            let mut out = Vec::new();
            splitter.split_2d(&footprint, &radial, &azimuthal, &mut out);
            let bins: Vec<u32> = out.iter().map(|&(b, _)| b).collect();
            assert!(bins.contains(&0), "{}: {bins:?}", splitter.name());
            assert!(bins.contains(&35), "{}: {bins:?}", splitter.name());
            assert_relative_eq!(total(&out), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_beam_centre_pixel_covers_full_circle() {
        let geometry = GeometryParams::new()
            .with_shape(5, 5)
            .with_beam_center(2.5, 2.5)
            .build()
            .unwrap();
        let footprint = geometry.footprint(2, 2, RadialUnit::TwoThetaDeg);
        assert!(footprint.contains_beam);
        let (_, hi) = footprint.radial_range();
        let radial = BinAxis::uniform(2, 0.0, hi * 2.0).unwrap();
        let azimuthal = BinAxis::uniform(4, -180.0, 180.0).unwrap();
        let mut out = Vec::new();
        PolygonSplit.split_2d(&footprint, &radial, &azimuthal, &mut out);
        assert_eq!(out.len(), 4);
        assert_relative_eq!(total(&out), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_footprint_falls_back_to_centre() {
        let axis = BinAxis::uniform(4, 0.0, 4.0).unwrap();
        let point = ScatteringPosition::new(2.2, 0.0);
        let footprint = PixelFootprint::from_corners(point, [point; 4]);
        let mut out = Vec::new();
        PolygonSplit.split_radial(&footprint, &axis, &mut out);
        assert_eq!(out, vec![(2, 1.0)]);
    }
}
