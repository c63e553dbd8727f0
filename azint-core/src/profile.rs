//! Integrated profiles.
//!
//! A [`Profile`] stores one record per output bin as parallel vectors
//! (structure of arrays). 2-D profiles are azimuth-major: the value of
//! radial bin `r` and azimuthal bin `a` sits at `a * radial.len() + r`.

use crate::unit::RadialUnit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of an integration, owned by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Profile {
    /// Unit of `radial`.
    pub unit: RadialUnit,
    /// Radial bin centres.
    pub radial: Vec<f64>,
    /// Azimuthal bin centres in degrees; empty for 1-D profiles.
    pub azimuthal: Vec<f64>,
    /// Normalised intensity per bin.
    pub intensity: Vec<f64>,
    /// Uncertainty per bin when an error model was requested.
    pub sigma: Option<Vec<f64>>,
    /// Summed pixel weight per bin.
    pub sum_weight: Vec<f64>,
    /// Weighted sum of corrected intensities per bin.
    pub sum_signal: Vec<f64>,
    /// Number of pixels contributing to each bin.
    pub count: Vec<u32>,
}

/// One bin of a 1-D profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileRecord {
    /// Bin centre.
    pub position: f64,
    /// Normalised intensity.
    pub intensity: f64,
    /// Uncertainty, if computed.
    pub sigma: Option<f64>,
    /// Summed weight.
    pub sum_weight: f64,
}

impl Profile {
    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    /// Returns true when the profile holds no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    /// Whether the profile is radial × azimuthal.
    #[must_use]
    pub fn is_2d(&self) -> bool {
        !self.azimuthal.is_empty()
    }

    /// `(azimuthal bins, radial bins)`; `(1, n)` for 1-D profiles.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        if self.is_2d() {
            (self.azimuthal.len(), self.radial.len())
        } else {
            (1, self.radial.len())
        }
    }

    /// Intensity of radial bin `radial` in azimuthal bin `azimuthal`.
    #[must_use]
    pub fn get(&self, radial: usize, azimuthal: usize) -> Option<f64> {
        let (n_azim, n_rad) = self.shape();
        if radial < n_rad && azimuthal < n_azim {
            Some(self.intensity[azimuthal * n_rad + radial])
        } else {
            None
        }
    }

    /// Iterates over bins as records; 2-D profiles yield radial positions
    /// repeating for every azimuthal row.
    pub fn records(&self) -> impl Iterator<Item = ProfileRecord> + '_ {
        let n_rad = self.radial.len().max(1);
        (0..self.len()).map(move |i| ProfileRecord {
            position: self.radial[i % n_rad],
            intensity: self.intensity[i],
            sigma: self.sigma.as_ref().map(|s| s[i]),
            sum_weight: self.sum_weight[i],
        })
    }

    /// Sum of all bin weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.sum_weight.iter().sum()
    }

    /// Number of bins that received weight.
    #[must_use]
    pub fn populated_bins(&self) -> usize {
        self.sum_weight.iter().filter(|&&w| w > 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_2d() -> Profile {
        Profile {
            unit: RadialUnit::QNm,
            radial: vec![1.0, 2.0, 3.0],
            azimuthal: vec![-90.0, 90.0],
            intensity: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            sigma: None,
            sum_weight: vec![1.0, 1.0, 0.0, 1.0, 1.0, 1.0],
            sum_signal: vec![1.0, 2.0, 0.0, 4.0, 5.0, 6.0],
            count: vec![1, 1, 0, 1, 1, 1],
        }
    }

    #[test]
    fn test_profile_2d_indexing() {
        let profile = sample_2d();
        assert!(profile.is_2d());
        assert_eq!(profile.shape(), (2, 3));
        assert_eq!(profile.get(0, 1), Some(4.0));
        assert_eq!(profile.get(2, 0), Some(3.0));
        assert_eq!(profile.get(3, 0), None);
        assert_eq!(profile.populated_bins(), 5);
        assert!((profile.total_weight() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_profile_records() {
        let profile = sample_2d();
        let positions: Vec<f64> = profile.records().map(|r| r.position).collect();
        assert_eq!(positions, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        assert!(profile.records().all(|r| r.sigma.is_none()));
    }
}
