//! Integration configuration.
//!
//! Splitting method and error model are tagged variants chosen when an
//! integrator is configured; the algorithms crate maps each tag to its
//! implementation.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::unit::RadialUnit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a pixel's intensity is distributed over output bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SplitMethod {
    /// Whole pixel goes to the bin containing its centre.
    NoSplit,
    /// Split along the bounding box of the pixel corners.
    BBox,
    /// Split by exact overlap area of the pixel quadrilateral.
    #[default]
    Polygon,
}

impl SplitMethod {
    /// All methods, cheapest first.
    pub const ALL: [SplitMethod; 3] = [SplitMethod::NoSplit, SplitMethod::BBox, SplitMethod::Polygon];

    /// Short name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SplitMethod::NoSplit => "no_split",
            SplitMethod::BBox => "bbox",
            SplitMethod::Polygon => "polygon",
        }
    }

    /// Whether the method needs pixel corners, not just centres.
    #[must_use]
    pub fn uses_corners(self) -> bool {
        !matches!(self, SplitMethod::NoSplit)
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SplitMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no_split" | "nosplit" | "none" => Ok(SplitMethod::NoSplit),
            "bbox" => Ok(SplitMethod::BBox),
            "polygon" | "full" => Ok(SplitMethod::Polygon),
            other => Err(Error::InvalidConfig(format!("unknown split method '{other}'"))),
        }
    }
}

/// Per-bin uncertainty estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorModel {
    /// No uncertainty.
    #[default]
    NoErrors,
    /// Shot noise: pixel variance equals the raw count.
    Poisson,
    /// Caller-supplied per-pixel variance array.
    Variance,
    /// Spread of the pixel values falling in each bin.
    Azimuthal,
}

impl FromStr for ErrorModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "no_errors" => Ok(ErrorModel::NoErrors),
            "poisson" => Ok(ErrorModel::Poisson),
            "variance" => Ok(ErrorModel::Variance),
            "azimuthal" => Ok(ErrorModel::Azimuthal),
            other => Err(Error::InvalidConfig(format!("unknown error model '{other}'"))),
        }
    }
}

/// What to report for bins that received no weight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EmptyBins {
    /// Report NaN.
    #[default]
    Nan,
    /// Report a fixed value.
    Fill(f64),
    /// Drop the bin from 1-D profiles (2-D profiles fall back to NaN).
    Omit,
}

impl EmptyBins {
    /// Sentinel written into the intensity of an empty bin.
    #[must_use]
    pub fn sentinel(self) -> f64 {
        match self {
            EmptyBins::Fill(value) => value,
            EmptyBins::Nan | EmptyBins::Omit => f64::NAN,
        }
    }
}

/// What to do when no pixel contributes to any bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EmptyInputPolicy {
    /// Fail with [`Error::EmptyInput`].
    #[default]
    Error,
    /// Return a profile where every bin holds the empty-bin sentinel.
    Sentinel,
}

/// How the reduction is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Execution {
    /// Single thread, pixel order.
    Sequential,
    /// One task per bin range, reading the bin-major layout.
    #[default]
    BinParallel,
    /// Thread-local accumulators over pixel chunks, merged at the end.
    PixelParallel,
}

/// Scalar settings of an integration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IntegrationConfig {
    /// Pixel splitting method.
    pub method: SplitMethod,
    /// Radial unit of the output.
    pub unit: RadialUnit,
    /// Radial range; `None` uses the data extent.
    pub radial_range: Option<(f64, f64)>,
    /// Azimuthal range in degrees; `None` is the full circle.
    pub azimuth_range: Option<(f64, f64)>,
    /// Uncertainty estimate.
    pub error_model: ErrorModel,
    /// Raw value flagging invalid pixels.
    pub dummy: Option<f64>,
    /// Tolerance around `dummy`; `None` requires an exact match.
    pub delta_dummy: Option<f64>,
    /// Divide by the geometric solid angle.
    pub correct_solid_angle: bool,
    /// Divide by the polarization factor for this degree of polarization.
    pub polarization_factor: Option<f64>,
    /// Lower clamp for corrected intensities.
    pub floor: Option<f64>,
    /// Empty-bin reporting.
    pub empty_bins: EmptyBins,
    /// Behaviour when nothing contributes.
    pub empty_input: EmptyInputPolicy,
    /// Reduction scheduling.
    pub execution: Execution,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            method: SplitMethod::Polygon,
            unit: RadialUnit::TwoThetaDeg,
            radial_range: None,
            azimuth_range: None,
            error_model: ErrorModel::NoErrors,
            dummy: None,
            delta_dummy: None,
            correct_solid_angle: false,
            polarization_factor: None,
            floor: None,
            empty_bins: EmptyBins::Nan,
            empty_input: EmptyInputPolicy::Error,
            execution: Execution::BinParallel,
        }
    }
}

impl IntegrationConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    /// Restricts the radial range.
    #[must_use]
    pub fn with_radial_range(mut self, lo: f64, hi: f64) -> Self {
        self.radial_range = Some((lo, hi));
        self
    }

    /// Restricts the azimuthal range (degrees).
    #[must_use]
    pub fn with_azimuth_range(mut self, lo: f64, hi: f64) -> Self {
        self.azimuth_range = Some((lo, hi));
        self
    }

    /// Sets the error model.
    #[must_use]
    pub fn with_error_model(mut self, model: ErrorModel) -> Self {
        self.error_model = model;
        self
    }

    /// Sets the dummy value and optional tolerance.
    #[must_use]
    pub fn with_dummy(mut self, dummy: f64, delta_dummy: Option<f64>) -> Self {
        self.dummy = Some(dummy);
        self.delta_dummy = delta_dummy;
        self
    }

    /// Enables or disables the solid-angle correction.
    #[must_use]
    pub fn with_solid_angle(mut self, enabled: bool) -> Self {
        self.correct_solid_angle = enabled;
        self
    }

    /// Enables the polarization correction.
    #[must_use]
    pub fn with_polarization(mut self, factor: f64) -> Self {
        self.polarization_factor = Some(factor);
        self
    }

    /// Clamps corrected intensities from below.
    #[must_use]
    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = Some(floor);
        self
    }

    /// Sets the empty-bin policy.
    #[must_use]
    pub fn with_empty_bins(mut self, policy: EmptyBins) -> Self {
        self.empty_bins = policy;
        self
    }

    /// Sets the empty-input policy.
    #[must_use]
    pub fn with_empty_input(mut self, policy: EmptyInputPolicy) -> Self {
        self.empty_input = policy;
        self
    }

    /// Sets the reduction scheduling.
    #[must_use]
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Checks option consistency.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for reversed or non-finite ranges,
    /// a negative `delta_dummy`, or a polarization factor outside `[-1, 1]`.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, range) in [
            ("radial_range", self.radial_range),
            ("azimuth_range", self.azimuth_range),
        ] {
            if let Some((lo, hi)) = range {
                if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
                    return Err(Error::InvalidConfig(format!(
                        "{name} must be finite and increasing, got ({lo}, {hi})"
                    )));
                }
            }
        }
        if let Some(delta) = self.delta_dummy {
            if delta.is_nan() || delta < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "delta_dummy must be non-negative, got {delta}"
                )));
            }
        }
        if let Some(factor) = self.polarization_factor {
            if !(-1.0..=1.0).contains(&factor) {
                return Err(Error::InvalidConfig(format!(
                    "polarization factor must lie in [-1, 1], got {factor}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = IntegrationConfig::new()
            .with_method(SplitMethod::BBox)
            .with_unit(RadialUnit::QNm)
            .with_radial_range(1.0, 20.0)
            .with_dummy(-1.0, Some(0.5))
            .with_error_model(ErrorModel::Poisson)
            .with_execution(Execution::Sequential);

        assert_eq!(config.method, SplitMethod::BBox);
        assert_eq!(config.unit, RadialUnit::QNm);
        assert_eq!(config.radial_range, Some((1.0, 20.0)));
        assert_eq!(config.dummy, Some(-1.0));
        assert_eq!(config.delta_dummy, Some(0.5));
        assert_eq!(config.error_model, ErrorModel::Poisson);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = IntegrationConfig::default();
        assert_eq!(config.method, SplitMethod::Polygon);
        assert_eq!(config.empty_input, EmptyInputPolicy::Error);
        assert!(config.empty_bins.sentinel().is_nan());
        assert!(!config.correct_solid_angle);
    }

    #[test]
    fn test_config_validation() {
        assert!(IntegrationConfig::new()
            .with_radial_range(2.0, 1.0)
            .validate()
            .is_err());
        assert!(IntegrationConfig::new()
            .with_dummy(0.0, Some(-1.0))
            .validate()
            .is_err());
        assert!(IntegrationConfig::new()
            .with_polarization(1.5)
            .validate()
            .is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("bbox".parse::<SplitMethod>().unwrap(), SplitMethod::BBox);
        assert_eq!("Polygon".parse::<SplitMethod>().unwrap(), SplitMethod::Polygon);
        assert_eq!("poisson".parse::<ErrorModel>().unwrap(), ErrorModel::Poisson);
        assert!("splat".parse::<SplitMethod>().is_err());
        assert!((EmptyBins::Fill(-1.0).sentinel() + 1.0).abs() < f64::EPSILON);
    }
}
