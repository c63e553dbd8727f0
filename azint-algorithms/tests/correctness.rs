#![allow(clippy::uninlined_format_args)]
use std::sync::Arc;

use approx::assert_relative_eq;
use azint_algorithms::{
    reduce, AxisSpec, AzimuthalIntegrator, Corrections, EmptyBins, EmptyInputPolicy, Execution,
    IntegrationConfig, MappingBuilder, ReductionOptions, SplitMethod,
};
use azint_core::{Error, Geometry, GeometryParams, Mask, RadialUnit};
use ndarray::Array2;

fn tilted_geometry() -> Geometry {
    GeometryParams::new()
        .with_shape(24, 20)
        .with_dist(0.05)
        .with_beam_center(9.3, 11.7)
        .with_rotations(0.05, -0.03, 0.1)
        .build()
        .unwrap()
}

/// Deterministic, non-uniform test frame.
fn ramp(shape: (usize, usize)) -> Array2<f32> {
    Array2::from_shape_fn(shape, |(r, c)| ((r * 7 + c * 13) % 17) as f32 + 1.0)
}

#[test]
fn test_no_split_mapping_weights() {
    let geometry = tilted_geometry();
    let mapping = MappingBuilder::new(&geometry)
        .with_method(SplitMethod::NoSplit)
        .with_unit(RadialUnit::QNm)
        .build_1d(&AxisSpec::bins(50))
        .unwrap();
    assert_eq!(mapping.nnz(), geometry.pixel_count());
    for p in 0..mapping.pixel_count() {
        let entries: Vec<_> = mapping.pixel_entries(p).collect();
        assert_eq!(entries.len(), 1, "pixel {} has {} entries", p, entries.len());
        assert!((entries[0].1 - 1.0).abs() < f32::EPSILON);
    }
}

#[test]
fn test_split_weights_sum_to_one_inside_range() {
    let geometry = tilted_geometry();
    for method in [SplitMethod::BBox, SplitMethod::Polygon] {
        let mapping = MappingBuilder::new(&geometry)
            .with_method(method)
            .with_unit(RadialUnit::TwoThetaDeg)
            .build_1d(&AxisSpec::bins(40))
            .unwrap();
        for p in 0..mapping.pixel_count() {
            let sum = mapping.pixel_weight_sum(p);
            assert!(
                (sum - 1.0).abs() < 1e-5,
                "{} pixel {} sums to {}",
                method,
                p,
                sum
            );
        }
    }
}

#[test]
fn test_2d_weights_conserved_across_seam() {
    let geometry = tilted_geometry();
    for method in SplitMethod::ALL {
        let mapping = MappingBuilder::new(&geometry)
            .with_method(method)
            .build_2d(&AxisSpec::bins(12), &AxisSpec::bins(36))
            .unwrap();
        let total: f64 = mapping.bin_weight_sums().iter().sum();
        assert_relative_eq!(total, geometry.pixel_count() as f64, epsilon = 1e-3);
        for p in 0..mapping.pixel_count() {
            assert!((mapping.pixel_weight_sum(p) - 1.0).abs() < 1e-5, "{} pixel {}", method, p);
        }
    }
}

#[test]
fn test_execution_strategies_agree() {
    let geometry = tilted_geometry();
    let image = ramp(geometry.shape());
    for method in SplitMethod::ALL {
        let mapping = MappingBuilder::new(&geometry)
            .with_method(method)
            .build_1d(&AxisSpec::bins(30))
            .unwrap();
        let run = |execution| {
            let options = ReductionOptions {
                execution,
                error_model: azint_core::ErrorModel::Azimuthal,
                ..ReductionOptions::default()
            };
            reduce(&mapping, image.view(), &Corrections::new(), &options).unwrap()
        };
        let reference = run(Execution::Sequential);
        for execution in [Execution::BinParallel, Execution::PixelParallel] {
            let other = run(execution);
            assert_eq!(reference.count, other.count);
            for (a, b) in reference.intensity.iter().zip(&other.intensity) {
                if a.is_nan() {
                    assert!(b.is_nan());
                } else {
                    assert_relative_eq!(*a, *b, max_relative = 1e-9);
                }
            }
            let (sa, sb) = (reference.sigma.as_ref().unwrap(), other.sigma.as_ref().unwrap());
            for (a, b) in sa.iter().zip(sb) {
                if !a.is_nan() {
                    assert_relative_eq!(*a, *b, epsilon = 1e-6, max_relative = 1e-6);
                }
            }
        }
    }
}

#[test]
fn test_uniform_image_every_method() {
    let geometry = Arc::new(tilted_geometry());
    let image = Array2::from_elem(geometry.shape(), 3.5f32);
    for method in SplitMethod::ALL {
        for execution in [Execution::Sequential, Execution::BinParallel, Execution::PixelParallel] {
            let config = IntegrationConfig::new()
                .with_method(method)
                .with_execution(execution);
            let ai = AzimuthalIntegrator::new(Arc::clone(&geometry)).with_config(config);
            let profile = ai.integrate1d(image.view(), 25, &Corrections::new()).unwrap();
            for (i, v) in profile.intensity.iter().enumerate() {
                if profile.sum_weight[i] > 0.0 {
                    assert_relative_eq!(*v, 3.5, epsilon = 1e-6);
                }
            }
            let map = ai.integrate2d(image.view(), 10, 18, &Corrections::new()).unwrap();
            for (i, v) in map.intensity.iter().enumerate() {
                if map.sum_weight[i] > 0.0 {
                    assert_relative_eq!(*v, 3.5, epsilon = 1e-6);
                }
            }
        }
    }
}

#[test]
fn test_fully_masked_image_policies() {
    let geometry = Arc::new(tilted_geometry());
    let mask = Mask::new(Array2::from_elem(geometry.shape(), true));
    let image = Array2::from_elem(geometry.shape(), 1.0f32);
    let corrections = Corrections::new().with_mask(&mask);

    let strict = AzimuthalIntegrator::new(Arc::clone(&geometry));
    let result = strict.integrate1d(image.view(), 10, &corrections);
    assert!(matches!(result, Err(Error::EmptyInput(_))));

    let lenient = AzimuthalIntegrator::new(Arc::clone(&geometry)).with_config(
        IntegrationConfig::new()
            .with_empty_input(EmptyInputPolicy::Sentinel)
            .with_empty_bins(EmptyBins::Fill(-1.0)),
    );
    let profile = lenient.integrate1d(image.view(), 10, &corrections).unwrap();
    assert_eq!(profile.len(), 10);
    assert!(profile.intensity.iter().all(|&v| (v + 1.0).abs() < f64::EPSILON));
    assert!(profile.sum_weight.iter().all(|&w| w == 0.0));

    let nan_policy = AzimuthalIntegrator::new(Arc::clone(&geometry)).with_config(
        IntegrationConfig::new()
            .with_empty_input(EmptyInputPolicy::Sentinel)
            .with_empty_bins(EmptyBins::Omit),
    );
    let profile = nan_policy.integrate1d(image.view(), 10, &corrections).unwrap();
    assert_eq!(profile.len(), 10);
    assert!(profile.intensity.iter().all(|v| v.is_nan()));
}

#[test]
fn test_four_by_four_rings() {
    let geometry = Arc::new(
        GeometryParams::new()
            .with_shape(4, 4)
            .with_dist(1.0)
            .with_beam_center(2.0, 2.0)
            .build()
            .unwrap(),
    );
    // Inner ring centres sit 0.07 mm from the beam, outer ring 0.16 to 0.21 mm.
    let config = IntegrationConfig::new()
        .with_method(SplitMethod::NoSplit)
        .with_unit(RadialUnit::RMm)
        .with_radial_range(0.0, 0.25);
    let ai = AzimuthalIntegrator::new(geometry).with_config(config);
    let image = Array2::from_elem((4, 4), 1.0f32);
    let profile = ai.integrate1d(image.view(), 2, &Corrections::new()).unwrap();
    assert_eq!(profile.len(), 2);
    assert_relative_eq!(profile.intensity[0], 1.0);
    assert_relative_eq!(profile.intensity[1], 1.0);
    assert_eq!(profile.count, vec![4, 12]);
    assert!(profile.sum_weight.iter().all(|&w| w > 0.0));
}

#[test]
fn test_four_by_four_polygon_over_data_extent() {
    let geometry = Arc::new(
        GeometryParams::new()
            .with_shape(4, 4)
            .with_dist(1.0)
            .with_beam_center(2.0, 2.0)
            .build()
            .unwrap(),
    );
    let ai = AzimuthalIntegrator::new(geometry)
        .with_config(IntegrationConfig::new().with_unit(RadialUnit::RMm));
    let image = Array2::from_elem((4, 4), 1.0f32);
    let profile = ai.integrate1d(image.view(), 2, &Corrections::new()).unwrap();
    assert_eq!(profile.len(), 2);
    assert_relative_eq!(profile.intensity[0], 1.0, epsilon = 1e-9);
    assert_relative_eq!(profile.intensity[1], 1.0, epsilon = 1e-9);
    assert!(profile.sum_weight[0] > 0.0);
    assert!(profile.sum_weight[0] < profile.sum_weight[1]);
    assert_relative_eq!(profile.sum_weight.iter().sum::<f64>(), 16.0, epsilon = 1e-6);
}

#[test]
fn test_radial_range_beyond_data() {
    let geometry = Arc::new(
        GeometryParams::new()
            .with_shape(16, 16)
            .with_beam_center(8.0, 8.0)
            .build()
            .unwrap(),
    );
    let config = IntegrationConfig::new()
        .with_method(SplitMethod::NoSplit)
        .with_unit(RadialUnit::RMm)
        .with_radial_range(100.0, 120.0);
    let ai = AzimuthalIntegrator::new(geometry).with_config(config);
    let image = Array2::from_elem((16, 16), 1.0f32);
    let profile = ai.integrate1d(image.view(), 5, &Corrections::new()).unwrap();
    assert_eq!(profile.len(), 5);
    assert!(profile.intensity.iter().all(|v| v.is_nan()));
    assert!(profile.sum_weight.iter().all(|&w| w == 0.0));
    assert!(profile.count.iter().all(|&n| n == 0));
}

#[test]
fn test_dummy_pixel_contributes_nothing() {
    let geometry = Arc::new(tilted_geometry());
    let config = IntegrationConfig::new()
        .with_method(SplitMethod::Polygon)
        .with_dummy(-2.0, None)
        .with_execution(Execution::Sequential);
    let ai = AzimuthalIntegrator::new(Arc::clone(&geometry)).with_config(config);

    let base = ramp(geometry.shape());
    let mut with_dummy = base.clone();
    with_dummy[[5, 6]] = -2.0;

    let clean = ai.integrate1d(base.view(), 20, &Corrections::new()).unwrap();
    let dirty = ai.integrate1d(with_dummy.view(), 20, &Corrections::new()).unwrap();

    // Same sums as if pixel (5, 6) were masked out.
    let mut mask = Array2::from_elem(geometry.shape(), false);
    mask[[5, 6]] = true;
    let mask = Mask::new(mask);
    let masked = ai
        .integrate1d(base.view(), 20, &Corrections::new().with_mask(&mask))
        .unwrap();

    let pixel = 5 * geometry.shape().1 + 6;
    let mapping = ai.mapping_1d(AxisSpec::bins(20), None).unwrap();
    let touched: Vec<usize> = mapping.pixel_entries(pixel).map(|(b, _)| b).collect();
    assert!(!touched.is_empty());
    for &b in &touched {
        assert!(dirty.sum_weight[b] < clean.sum_weight[b]);
        assert_relative_eq!(dirty.sum_weight[b], masked.sum_weight[b], epsilon = 1e-9);
        assert_relative_eq!(dirty.sum_signal[b], masked.sum_signal[b], epsilon = 1e-9);
    }
}

#[test]
fn test_shape_mismatch_is_reported() {
    let geometry = Arc::new(tilted_geometry());
    let ai = AzimuthalIntegrator::new(geometry);
    let image = Array2::from_elem((24, 20), 1.0f32);
    let flat = Array2::from_elem((20, 24), 1.0f32);
    let result = ai.integrate1d(image.view(), 10, &Corrections::new().with_flat(flat.view()));
    assert!(matches!(
        result,
        Err(Error::ShapeMismatch {
            name: "flat",
            expected: (24, 20),
            actual: (20, 24)
        })
    ));
}
