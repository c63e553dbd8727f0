//! Error types for azint-core.

use thiserror::Error;

/// Result type alias for azint operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for azint operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed calibration parameters.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// An input array disagrees with the detector shape.
    #[error("shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which input was rejected (image, mask, dark, ...).
        name: &'static str,
        /// Detector shape (rows, cols).
        expected: (usize, usize),
        /// Shape that was supplied.
        actual: (usize, usize),
    },

    /// Non-increasing, non-finite or degenerate bin edges.
    #[error("invalid bin axis: {0}")]
    InvalidBinAxis(String),

    /// Nothing left to reduce once masks and dummies are applied.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Inconsistent integration options.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[cfg(feature = "serde")]
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[cfg(feature = "serde")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a [`Error::ShapeMismatch`] for the named input.
    #[must_use]
    pub fn shape_mismatch(name: &'static str, expected: (usize, usize), actual: (usize, usize)) -> Self {
        Self::ShapeMismatch {
            name,
            expected,
            actual,
        }
    }
}
