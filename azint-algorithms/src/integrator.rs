//! High-level integrator: geometry + configuration + mapping cache.
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use azint_core::{BinAxis, Error, Geometry, IntegrationConfig, Mask, Profile, Result};
use ndarray::{Array2, ArrayView2};

use crate::cache::{MappingCache, MappingKey};
use crate::mapping::{AxisSpec, MappingBuilder, SparseMapping};
use crate::reduction::{reduce, Corrections, ReductionOptions};

/// Integrates detector frames of one geometry.
///
/// Cheap to share between threads: all methods take `&self`, mappings come
/// from a (possibly shared) [`MappingCache`] and the geometric correction
/// arrays are computed once.
#[derive(Debug)]
pub struct AzimuthalIntegrator {
    geometry: Arc<Geometry>,
    cache: Arc<MappingCache>,
    config: IntegrationConfig,
    solid_angle: OnceLock<Array2<f32>>,
    polarization: Mutex<Option<(u64, Arc<Array2<f32>>)>>,
}

impl AzimuthalIntegrator {
    /// Creates an integrator with a private cache and default settings.
    #[must_use]
    pub fn new(geometry: Arc<Geometry>) -> Self {
        Self {
            geometry,
            cache: Arc::new(MappingCache::default()),
            config: IntegrationConfig::default(),
            solid_angle: OnceLock::new(),
            polarization: Mutex::new(None),
        }
    }

    /// Uses `cache`, typically shared with other integrators.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<MappingCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the integration settings.
    #[must_use]
    pub fn with_config(mut self, config: IntegrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Detector geometry.
    #[must_use]
    pub fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    /// Integration settings.
    #[must_use]
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Mapping cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<MappingCache> {
        &self.cache
    }

    fn radial_spec(&self, bins: usize) -> AxisSpec {
        AxisSpec::Uniform {
            bins,
            range: self.config.radial_range,
        }
    }

    /// Cached 1-D mapping for `radial`.
    pub fn mapping_1d(&self, radial: AxisSpec, mask: Option<&Mask>) -> Result<Arc<SparseMapping>> {
        self.config.validate()?;
        let key = MappingKey::radial(
            &self.geometry,
            self.config.method,
            self.config.unit,
            radial.clone(),
            self.config.azimuth_range,
            mask,
        );
        self.cache.get_or_build(key, || {
            MappingBuilder::new(&self.geometry)
                .with_method(self.config.method)
                .with_unit(self.config.unit)
                .with_mask(mask)
                .with_azimuth_range(self.config.azimuth_range)
                .build_1d(&radial)
        })
    }

    /// Cached 2-D mapping for `radial` × `azimuthal`.
    pub fn mapping_2d(
        &self,
        radial: AxisSpec,
        azimuthal: AxisSpec,
        mask: Option<&Mask>,
    ) -> Result<Arc<SparseMapping>> {
        self.config.validate()?;
        let key = MappingKey::radial_azimuthal(
            &self.geometry,
            self.config.method,
            self.config.unit,
            radial.clone(),
            azimuthal.clone(),
            mask,
        );
        self.cache.get_or_build(key, || {
            MappingBuilder::new(&self.geometry)
                .with_method(self.config.method)
                .with_unit(self.config.unit)
                .with_mask(mask)
                .build_2d(&radial, &azimuthal)
        })
    }

    /// Integrates `image` into `bins` radial bins.
    pub fn integrate1d(
        &self,
        image: ArrayView2<'_, f32>,
        bins: usize,
        corrections: &Corrections<'_>,
    ) -> Result<Profile> {
        self.integrate1d_spec(image, self.radial_spec(bins), corrections)
    }

    /// Integrates `image` onto caller-supplied radial bin edges.
    pub fn integrate1d_with_axis(
        &self,
        image: ArrayView2<'_, f32>,
        radial: BinAxis,
        corrections: &Corrections<'_>,
    ) -> Result<Profile> {
        self.integrate1d_spec(image, AxisSpec::Edges(radial), corrections)
    }

    fn integrate1d_spec(
        &self,
        image: ArrayView2<'_, f32>,
        radial: AxisSpec,
        corrections: &Corrections<'_>,
    ) -> Result<Profile> {
        self.check_image(image)?;
        let mapping = self.mapping_1d(radial, corrections.mask)?;
        self.reduce_with(&mapping, image, corrections)
    }

    /// Integrates `image` into a radial × azimuthal map.
    ///
    /// The azimuthal axis covers `azimuth_range` when configured and the
    /// full circle `[-180, 180)` otherwise.
    pub fn integrate2d(
        &self,
        image: ArrayView2<'_, f32>,
        radial_bins: usize,
        azimuthal_bins: usize,
        corrections: &Corrections<'_>,
    ) -> Result<Profile> {
        self.check_image(image)?;
        let azimuthal = AxisSpec::Uniform {
            bins: azimuthal_bins,
            range: self.config.azimuth_range,
        };
        let mapping = self.mapping_2d(self.radial_spec(radial_bins), azimuthal, corrections.mask)?;
        self.reduce_with(&mapping, image, corrections)
    }

    fn check_image(&self, image: ArrayView2<'_, f32>) -> Result<()> {
        let shape = self.geometry.shape();
        if image.dim() != shape {
            return Err(Error::shape_mismatch("image", shape, image.dim()));
        }
        Ok(())
    }

    /// Fills in the geometric corrections the configuration asks for and
    /// the caller did not supply, then reduces.
    fn reduce_with(
        &self,
        mapping: &SparseMapping,
        image: ArrayView2<'_, f32>,
        corrections: &Corrections<'_>,
    ) -> Result<Profile> {
        let polarization = match self.config.polarization_factor {
            Some(factor) if corrections.polarization.is_none() => Some(self.polarization(factor)),
            _ => None,
        };
        let solid_angle = (self.config.correct_solid_angle && corrections.solid_angle.is_none())
            .then(|| self.solid_angle.get_or_init(|| self.geometry.solid_angle_array()));
        // Reborrow to one lifetime shared with the filled-in arrays.
        let corrections = Corrections {
            mask: corrections.mask,
            dark: corrections.dark.map(|a| a.reborrow()),
            flat: corrections.flat.map(|a| a.reborrow()),
            solid_angle: corrections
                .solid_angle
                .map(|a| a.reborrow())
                .or_else(|| solid_angle.map(Array2::view)),
            polarization: corrections
                .polarization
                .map(|a| a.reborrow())
                .or_else(|| polarization.as_deref().map(Array2::view)),
            variance: corrections.variance.map(|a| a.reborrow()),
        };
        reduce(mapping, image, &corrections, &ReductionOptions::from(&self.config))
    }

    fn polarization(&self, factor: f64) -> Arc<Array2<f32>> {
        let mut memo = self
            .polarization
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match memo.as_ref() {
            Some((bits, array)) if *bits == factor.to_bits() => Arc::clone(array),
            _ => {
                let array = Arc::new(self.geometry.polarization_array(factor));
                *memo = Some((factor.to_bits(), Arc::clone(&array)));
                array
            }
        }
    }
}
