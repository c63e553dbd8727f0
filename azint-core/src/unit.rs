//! Radial units for scattering-space coordinates.
#![allow(clippy::doc_markdown)]

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unit of the radial coordinate of an integrated profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RadialUnit {
    /// Scattering angle 2θ in degrees.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "2th_deg"))]
    TwoThetaDeg,
    /// Scattering angle 2θ in radians.
    #[cfg_attr(feature = "serde", serde(rename = "2th_rad"))]
    TwoThetaRad,
    /// Momentum transfer in inverse nanometres.
    #[cfg_attr(feature = "serde", serde(rename = "q_nm^-1"))]
    QNm,
    /// Momentum transfer in inverse ångström.
    #[cfg_attr(feature = "serde", serde(rename = "q_A^-1"))]
    QA,
    /// In-plane radius in millimetres.
    #[cfg_attr(feature = "serde", serde(rename = "r_mm"))]
    RMm,
}

impl RadialUnit {
    /// All supported units, in display order.
    pub const ALL: [RadialUnit; 5] = [
        RadialUnit::TwoThetaDeg,
        RadialUnit::TwoThetaRad,
        RadialUnit::QNm,
        RadialUnit::QA,
        RadialUnit::RMm,
    ];

    /// Canonical short name, e.g. `q_nm^-1`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RadialUnit::TwoThetaDeg => "2th_deg",
            RadialUnit::TwoThetaRad => "2th_rad",
            RadialUnit::QNm => "q_nm^-1",
            RadialUnit::QA => "q_A^-1",
            RadialUnit::RMm => "r_mm",
        }
    }

    /// Converts a scattering angle (radians) and in-plane radius (metres)
    /// into this unit. `wavelength` is in metres.
    #[inline]
    #[must_use]
    pub fn convert(self, two_theta: f64, radius_m: f64, wavelength: f64) -> f64 {
        match self {
            RadialUnit::TwoThetaDeg => two_theta.to_degrees(),
            RadialUnit::TwoThetaRad => two_theta,
            RadialUnit::QNm => 4.0e-9 * PI / wavelength * (0.5 * two_theta).sin(),
            RadialUnit::QA => 4.0e-10 * PI / wavelength * (0.5 * two_theta).sin(),
            RadialUnit::RMm => radius_m * 1.0e3,
        }
    }
}

impl fmt::Display for RadialUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RadialUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2th_deg" | "2th" => Ok(RadialUnit::TwoThetaDeg),
            "2th_rad" => Ok(RadialUnit::TwoThetaRad),
            "q_nm^-1" | "q" => Ok(RadialUnit::QNm),
            "q_A^-1" => Ok(RadialUnit::QA),
            "r_mm" | "r" => Ok(RadialUnit::RMm),
            other => Err(Error::InvalidConfig(format!("unknown radial unit '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_round_trip_names() {
        for unit in RadialUnit::ALL {
            assert_eq!(unit.name().parse::<RadialUnit>().unwrap(), unit);
        }
        assert!("furlong".parse::<RadialUnit>().is_err());
    }

    #[test]
    fn test_q_conversion() {
        // 1 Å at 2θ = 60°: q = 4π/λ sin(30°) = 2π Å⁻¹
        let wavelength = 1.0e-10;
        let tth = 60f64.to_radians();
        assert_relative_eq!(
            RadialUnit::QA.convert(tth, 0.0, wavelength),
            2.0 * PI,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            RadialUnit::QNm.convert(tth, 0.0, wavelength),
            20.0 * PI,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_radius_and_angle_conversion() {
        assert_relative_eq!(RadialUnit::RMm.convert(0.3, 0.025, 1e-10), 25.0);
        assert_relative_eq!(RadialUnit::TwoThetaDeg.convert(PI, 0.0, 1e-10), 180.0);
        assert_relative_eq!(RadialUnit::TwoThetaRad.convert(0.25, 0.0, 1e-10), 0.25);
    }
}
