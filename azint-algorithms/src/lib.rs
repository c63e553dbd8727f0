//! azint-algorithms: Pixel splitting and sparse-matrix integration.
//!
//! This crate turns a calibrated geometry into a reusable sparse mapping and
//! reduces frames through it:
//! - **Splitting** - no-split, bounding-box and exact polygon overlap
//! - **Mapping** - compressed pixel-major and bin-major weights, built in parallel
//! - **Cache** - shared, single-build-per-key LRU of mappings
//! - **Reduction** - sequential, bin-parallel and pixel-parallel accumulation
//! - **Averaging** - dark/flat frame preparation
//!
#![warn(missing_docs)]

pub mod average;
mod cache;
mod integrator;
mod mapping;
pub mod polygon;
mod reduction;
mod splitting;

pub use average::{average_dark, prepare_flat, Accumulation, CenterMethod, FrameAccumulator, FrameReducer};
pub use cache::{CacheStatistics, MappingCache, MappingKey, DEFAULT_CAPACITY};
pub use integrator::AzimuthalIntegrator;
pub use mapping::{AxisSpec, MappingBuilder, SparseMapping};
pub use reduction::{reduce, Corrections, ReductionOptions};
pub use splitting::{BBoxSplit, NoSplit, PixelSplitter, PolygonSplit};

// Re-export core configuration types
pub use azint_core::{
    BinAxis, EmptyBins, EmptyInputPolicy, ErrorModel, Execution, IntegrationConfig, SplitMethod,
};
