//! azint-core: Core types for azimuthal integration.
//!
//! This crate provides the value types shared by the integration engine:
//! the calibrated detector geometry and its pixel → scattering-space
//! transform, bin axes, masks, integration settings and profiles.
//!

pub mod axis;
pub mod config;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod profile;
pub mod unit;

pub use axis::BinAxis;
pub use config::{EmptyBins, EmptyInputPolicy, ErrorModel, Execution, IntegrationConfig, SplitMethod};
pub use error::{Error, Result};
pub use geometry::{CornerGrid, Geometry, GeometryParams, PixelFootprint, ScatteringPosition};
pub use mask::Mask;
pub use profile::{Profile, ProfileRecord};
pub use unit::RadialUnit;
