//! Detector geometry and the pixel → scattering-space transform.
//!
//! The geometry follows the point-of-normal-incidence (PONI) convention:
//! `dist` is the perpendicular sample–detector distance, `poni1`/`poni2`
//! locate the foot of that perpendicular on the detector (metres along rows
//! and columns) and `rot1..rot3` tilt the detector plane. A detector point is
//! rotated into the laboratory frame and then expressed as a scattering angle
//! 2θ and an azimuthal angle χ.
#![allow(
    clippy::cast_precision_loss,
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

use std::hash::{Hash, Hasher};

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::unit::RadialUnit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Raw calibration parameters, before validation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeometryParams {
    /// Sample to detector-plane distance (m).
    pub dist: f64,
    /// PONI offset along rows (m).
    pub poni1: f64,
    /// PONI offset along columns (m).
    pub poni2: f64,
    /// Rotation about the row axis (rad).
    pub rot1: f64,
    /// Rotation about the column axis (rad).
    pub rot2: f64,
    /// Rotation about the beam axis (rad).
    pub rot3: f64,
    /// Pixel pitch along rows (m).
    pub pixel1: f64,
    /// Pixel pitch along columns (m).
    pub pixel2: f64,
    /// Radiation wavelength (m).
    pub wavelength: f64,
    /// Detector shape (rows, cols).
    pub shape: (usize, usize),
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            dist: 0.1,
            poni1: 0.0,
            poni2: 0.0,
            rot1: 0.0,
            rot2: 0.0,
            rot3: 0.0,
            pixel1: 100e-6,
            pixel2: 100e-6,
            wavelength: 1.0e-10,
            shape: (1024, 1024),
        }
    }
}

impl GeometryParams {
    /// Creates parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sample–detector distance (m).
    #[must_use]
    pub fn with_dist(mut self, dist: f64) -> Self {
        self.dist = dist;
        self
    }

    /// Sets the PONI offsets (m).
    #[must_use]
    pub fn with_poni(mut self, poni1: f64, poni2: f64) -> Self {
        self.poni1 = poni1;
        self.poni2 = poni2;
        self
    }

    /// Sets the PONI from a beam centre expressed in (fractional) pixels.
    ///
    /// Pixel `i` spans `[i, i + 1)`, so a centre of `(2.0, 2.0)` sits on the
    /// shared corner of pixels (1, 1) and (2, 2).
    #[must_use]
    pub fn with_beam_center(mut self, row: f64, col: f64) -> Self {
        self.poni1 = row * self.pixel1;
        self.poni2 = col * self.pixel2;
        self
    }

    /// Sets the three detector rotations (rad).
    #[must_use]
    pub fn with_rotations(mut self, rot1: f64, rot2: f64, rot3: f64) -> Self {
        self.rot1 = rot1;
        self.rot2 = rot2;
        self.rot3 = rot3;
        self
    }

    /// Sets the pixel pitch (m).
    #[must_use]
    pub fn with_pixel_size(mut self, pixel1: f64, pixel2: f64) -> Self {
        self.pixel1 = pixel1;
        self.pixel2 = pixel2;
        self
    }

    /// Sets the wavelength (m).
    #[must_use]
    pub fn with_wavelength(mut self, wavelength: f64) -> Self {
        self.wavelength = wavelength;
        self
    }

    /// Sets the detector shape (rows, cols).
    #[must_use]
    pub fn with_shape(mut self, rows: usize, cols: usize) -> Self {
        self.shape = (rows, cols);
        self
    }

    /// Validates the parameters and builds a [`Geometry`].
    pub fn build(self) -> Result<Geometry> {
        Geometry::new(self)
    }

    fn validate(&self) -> Result<()> {
        let finite = [
            ("dist", self.dist),
            ("poni1", self.poni1),
            ("poni2", self.poni2),
            ("rot1", self.rot1),
            ("rot2", self.rot2),
            ("rot3", self.rot3),
            ("pixel1", self.pixel1),
            ("pixel2", self.pixel2),
            ("wavelength", self.wavelength),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(Error::InvalidGeometry(format!("{name} is not finite: {value}")));
            }
        }
        let positive = [
            ("dist", self.dist),
            ("pixel1", self.pixel1),
            ("pixel2", self.pixel2),
            ("wavelength", self.wavelength),
        ];
        for (name, value) in positive {
            if value <= 0.0 {
                return Err(Error::InvalidGeometry(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.shape.0 == 0 || self.shape.1 == 0 {
            return Err(Error::InvalidGeometry(format!(
                "degenerate detector shape {:?}",
                self.shape
            )));
        }
        Ok(())
    }
}

/// Position of a detector point in scattering space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatteringPosition {
    /// Radial coordinate in the requested unit.
    pub radial: f64,
    /// Azimuthal angle χ in degrees, in `(-180, 180]`.
    pub chi: f64,
}

impl ScatteringPosition {
    /// Creates a position.
    #[inline]
    #[must_use]
    pub fn new(radial: f64, chi: f64) -> Self {
        Self { radial, chi }
    }
}

/// Scattering-space footprint of one pixel: its centre plus four corners.
///
/// Corner χ values are unwrapped to lie within 180° of the centre so the
/// quadrilateral never jumps across the ±180° seam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelFootprint {
    /// Pixel centre.
    pub center: ScatteringPosition,
    /// Corners in order (r, c), (r+1, c), (r+1, c+1), (r, c+1).
    pub corners: [ScatteringPosition; 4],
    /// The pixel surrounds the beam centre: χ covers the whole circle.
    pub contains_beam: bool,
}

impl PixelFootprint {
    /// Builds a footprint, unwrapping corner χ around the centre.
    #[must_use]
    pub fn from_corners(center: ScatteringPosition, mut corners: [ScatteringPosition; 4]) -> Self {
        let mut chi_min = f64::INFINITY;
        let mut chi_max = f64::NEG_INFINITY;
        for corner in &mut corners {
            while corner.chi - center.chi > 180.0 {
                corner.chi -= 360.0;
            }
            while corner.chi - center.chi < -180.0 {
                corner.chi += 360.0;
            }
            chi_min = chi_min.min(corner.chi);
            chi_max = chi_max.max(corner.chi);
        }
        Self {
            center,
            corners,
            contains_beam: chi_max - chi_min > 180.0,
        }
    }

    /// Radial extent of the corners. Starts at zero when the pixel
    /// surrounds the beam centre.
    #[must_use]
    pub fn radial_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .corners
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(c.radial), hi.max(c.radial))
            });
        if self.contains_beam {
            (lo.min(0.0), hi)
        } else {
            (lo, hi)
        }
    }

    /// Azimuthal extent of the (unwrapped) corners in degrees.
    #[must_use]
    pub fn chi_range(&self) -> (f64, f64) {
        self.corners
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(c.chi), hi.max(c.chi))
            })
    }
}

/// Radial and azimuthal coordinates of every pixel corner,
/// shape `(rows + 1, cols + 1)`.
#[derive(Debug, Clone)]
pub struct CornerGrid {
    /// Radial coordinate per corner.
    pub radial: Array2<f64>,
    /// χ in degrees per corner.
    pub chi: Array2<f64>,
}

impl CornerGrid {
    /// Assembles the footprint of pixel `(row, col)` from shared corners.
    #[inline]
    #[must_use]
    pub fn footprint(&self, row: usize, col: usize, center: ScatteringPosition) -> PixelFootprint {
        let at = |r: usize, c: usize| ScatteringPosition::new(self.radial[[r, c]], self.chi[[r, c]]);
        PixelFootprint::from_corners(
            center,
            [
                at(row, col),
                at(row + 1, col),
                at(row + 1, col + 1),
                at(row, col + 1),
            ],
        )
    }
}

/// Validated, immutable detector geometry.
///
/// Shared read-only between integrations, typically behind an `Arc`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "GeometryParams", into = "GeometryParams")
)]
pub struct Geometry {
    params: GeometryParams,
    rotation: [[f64; 3]; 3],
}

impl PartialEq for Geometry {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

impl TryFrom<GeometryParams> for Geometry {
    type Error = Error;

    fn try_from(params: GeometryParams) -> Result<Self> {
        Geometry::new(params)
    }
}

impl From<Geometry> for GeometryParams {
    fn from(geometry: Geometry) -> Self {
        geometry.params
    }
}

impl Geometry {
    /// Validates calibration parameters.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] when the distance, pixel pitch or
    /// wavelength is not positive, a parameter is not finite, or the shape
    /// has a zero dimension.
    pub fn new(params: GeometryParams) -> Result<Self> {
        params.validate()?;
        let rotation = rotation_matrix(params.rot1, params.rot2, params.rot3);
        Ok(Self { params, rotation })
    }

    /// Calibration parameters.
    #[must_use]
    pub fn params(&self) -> &GeometryParams {
        &self.params
    }

    /// Sample–detector distance (m).
    #[must_use]
    pub fn dist(&self) -> f64 {
        self.params.dist
    }

    /// Wavelength (m).
    #[must_use]
    pub fn wavelength(&self) -> f64 {
        self.params.wavelength
    }

    /// Detector shape (rows, cols).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.params.shape
    }

    /// Number of pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.params.shape.0 * self.params.shape.1
    }

    /// Identity of the calibration, used in mapping cache keys.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let p = &self.params;
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for value in [
            p.dist,
            p.poni1,
            p.poni2,
            p.rot1,
            p.rot2,
            p.rot3,
            p.pixel1,
            p.pixel2,
            p.wavelength,
        ] {
            value.to_bits().hash(&mut hasher);
        }
        p.shape.hash(&mut hasher);
        hasher.finish()
    }

    /// Laboratory-frame vector of a detector point given in fractional
    /// pixel coordinates (`d1` along rows, `d2` along columns).
    #[inline]
    fn lab_vector(&self, d1: f64, d2: f64) -> [f64; 3] {
        let p1 = d1 * self.params.pixel1 - self.params.poni1;
        let p2 = d2 * self.params.pixel2 - self.params.poni2;
        let l = self.params.dist;
        let m = &self.rotation;
        [
            m[0][0] * p1 + m[0][1] * p2 + m[0][2] * l,
            m[1][0] * p1 + m[1][1] * p2 + m[1][2] * l,
            m[2][0] * p1 + m[2][1] * p2 + m[2][2] * l,
        ]
    }

    /// Scattering-space position of a fractional detector point.
    #[inline]
    #[must_use]
    pub fn position_at(&self, d1: f64, d2: f64, unit: RadialUnit) -> ScatteringPosition {
        let [t1, t2, t3] = self.lab_vector(d1, d2);
        let rho = t1.hypot(t2);
        let two_theta = rho.atan2(t3);
        ScatteringPosition {
            radial: unit.convert(two_theta, rho, self.params.wavelength),
            chi: t1.atan2(t2).to_degrees(),
        }
    }

    /// Scattering-space position of the centre of pixel `(row, col)`.
    #[inline]
    #[must_use]
    pub fn position(&self, row: usize, col: usize, unit: RadialUnit) -> ScatteringPosition {
        self.position_at(row as f64 + 0.5, col as f64 + 0.5, unit)
    }

    /// Scattering-space positions of the four corners of pixel `(row, col)`.
    #[must_use]
    pub fn corners(&self, row: usize, col: usize, unit: RadialUnit) -> [ScatteringPosition; 4] {
        let r = row as f64;
        let c = col as f64;
        [
            self.position_at(r, c, unit),
            self.position_at(r + 1.0, c, unit),
            self.position_at(r + 1.0, c + 1.0, unit),
            self.position_at(r, c + 1.0, unit),
        ]
    }

    /// Centre and corners of pixel `(row, col)`.
    #[must_use]
    pub fn footprint(&self, row: usize, col: usize, unit: RadialUnit) -> PixelFootprint {
        PixelFootprint::from_corners(self.position(row, col, unit), self.corners(row, col, unit))
    }

    /// Radial coordinate of every pixel centre.
    #[must_use]
    pub fn radial_array(&self, unit: RadialUnit) -> Array2<f64> {
        Array2::from_shape_fn(self.params.shape, |(r, c)| self.position(r, c, unit).radial)
    }

    /// χ (degrees) of every pixel centre.
    #[must_use]
    pub fn chi_array(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.params.shape, |(r, c)| {
            self.position(r, c, RadialUnit::TwoThetaRad).chi
        })
    }

    /// Coordinates of every pixel corner, shared between neighbours.
    #[must_use]
    pub fn corner_grid(&self, unit: RadialUnit) -> CornerGrid {
        let (rows, cols) = self.params.shape;
        let positions = Array2::from_shape_fn((rows + 1, cols + 1), |(r, c)| {
            self.position_at(r as f64, c as f64, unit)
        });
        CornerGrid {
            radial: positions.mapv(|p| p.radial),
            chi: positions.mapv(|p| p.chi),
        }
    }

    /// Relative solid angle of every pixel, `(dist / |t|)³`; 1 at the PONI.
    #[must_use]
    pub fn solid_angle_array(&self) -> Array2<f32> {
        let l = self.params.dist;
        Array2::from_shape_fn(self.params.shape, |(r, c)| {
            let p1 = (r as f64 + 0.5) * self.params.pixel1 - self.params.poni1;
            let p2 = (c as f64 + 0.5) * self.params.pixel2 - self.params.poni2;
            let norm = (p1 * p1 + p2 * p2 + l * l).sqrt();
            #[allow(clippy::cast_possible_truncation)]
            let value = (l / norm).powi(3) as f32;
            value
        })
    }

    /// Polarization correction of every pixel for a linear polarization
    /// `factor` in `[-1, 1]` (0 = unpolarized, 1 = fully horizontal).
    #[must_use]
    pub fn polarization_array(&self, factor: f64) -> Array2<f32> {
        Array2::from_shape_fn(self.params.shape, |(r, c)| {
            let [t1, t2, t3] = self.lab_vector(r as f64 + 0.5, c as f64 + 0.5);
            let two_theta = t1.hypot(t2).atan2(t3);
            let chi = t1.atan2(t2);
            let cos2_tth = two_theta.cos().powi(2);
            #[allow(clippy::cast_possible_truncation)]
            let value =
                (0.5 * (1.0 + cos2_tth - factor * (2.0 * chi).cos() * (1.0 - cos2_tth))) as f32;
            value
        })
    }

    /// Loads and validates a geometry from a JSON string.
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: GeometryParams = serde_json::from_str(json)?;
        Geometry::new(params)
    }

    /// Loads and validates a geometry from a JSON file.
    #[cfg(feature = "serde")]
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Combined rotation applied to `(p1, p2, dist)`.
fn rotation_matrix(rot1: f64, rot2: f64, rot3: f64) -> [[f64; 3]; 3] {
    let (s1, c1) = rot1.sin_cos();
    let (s2, c2) = rot2.sin_cos();
    let (s3, c3) = rot3.sin_cos();
    [
        [c2 * c3, c3 * s1 * s2 - c1 * s3, -(c1 * c3 * s2 + s1 * s3)],
        [c2 * s3, c1 * c3 + s1 * s2 * s3, c3 * s1 - c1 * s2 * s3],
        [s2, -c2 * s1, c1 * c2],
    ]
}
